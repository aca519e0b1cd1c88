//! SeaORM Entity for the messages table.

use crate::deletion_reason::DeletionReason;
use crate::message_status::MessageStatus;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "chat", table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[serde(skip_deserializing)]
    pub id: Id,
    pub conversation_id: Id,
    pub sender_id: Id,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    #[serde(skip_deserializing)]
    pub status: MessageStatus,
    /// Must reference a message of the same conversation.
    pub reply_to_id: Option<Id>,
    #[serde(skip_deserializing)]
    pub is_edited: bool,
    #[serde(skip_deserializing)]
    pub edited_at: Option<DateTimeWithTimeZone>,
    #[serde(skip_deserializing)]
    pub delivered_at: Option<DateTimeWithTimeZone>,
    #[serde(skip_deserializing)]
    pub read_at: Option<DateTimeWithTimeZone>,
    pub ephemeral_seconds: Option<i32>,
    /// `created_at + ephemeral_seconds`, fixed at creation.
    #[serde(skip_deserializing)]
    pub ephemeral_expires_at: Option<DateTimeWithTimeZone>,
    #[serde(skip_deserializing)]
    pub deleted_at: Option<DateTimeWithTimeZone>,
    #[serde(skip_deserializing)]
    pub deletion_reason: Option<DeletionReason>,
    #[serde(skip_deserializing)]
    pub created_at: DateTimeWithTimeZone,
    #[serde(skip_deserializing)]
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversations::Entity",
        from = "Column::ConversationId",
        to = "super::conversations::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Conversations,
    #[sea_orm(has_many = "super::reactions::Entity")]
    Reactions,
}

impl Related<super::conversations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversations.def()
    }
}

impl Related<super::reactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
