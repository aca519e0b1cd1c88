use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Why a message row was tombstoned.
#[derive(Debug, Clone, Copy, Eq, PartialEq, EnumIter, Deserialize, Serialize, DeriveActiveEnum)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum DeletionReason {
    #[sea_orm(string_value = "sender")]
    Sender,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl std::fmt::Display for DeletionReason {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionReason::Sender => write!(fmt, "sender"),
            DeletionReason::Expired => write!(fmt, "expired"),
        }
    }
}
