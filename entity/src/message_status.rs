use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Server-side delivery status of a message.
///
/// Variants are declared in delivery order so that `Ord` follows the
/// forward-only progression `Sent < Delivered < Read`.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    Deserialize,
    Default,
    Serialize,
    DeriveActiveEnum,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum MessageStatus {
    /// Persisted; initial state
    #[sea_orm(string_value = "sent")]
    #[default]
    Sent,
    /// At least one recipient device acknowledged receipt
    #[sea_orm(string_value = "delivered")]
    Delivered,
    /// A recipient's read watermark passed the message
    #[sea_orm(string_value = "read")]
    Read,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sent => write!(fmt, "sent"),
            MessageStatus::Delivered => write!(fmt, "delivered"),
            MessageStatus::Read => write!(fmt, "read"),
        }
    }
}
