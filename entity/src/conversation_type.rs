use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of conversation. Fixed at creation.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, EnumIter, Deserialize, Default, Serialize, DeriveActiveEnum,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ConversationType {
    /// Exactly two participants, unique per unordered pair within a tenant
    #[sea_orm(string_value = "direct")]
    #[default]
    Direct,
    /// Named, admin-managed membership
    #[sea_orm(string_value = "group")]
    Group,
    /// One-to-many; only admins post
    #[sea_orm(string_value = "broadcast")]
    Broadcast,
}

impl std::fmt::Display for ConversationType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationType::Direct => write!(fmt, "direct"),
            ConversationType::Group => write!(fmt, "group"),
            ConversationType::Broadcast => write!(fmt, "broadcast"),
        }
    }
}
