//! SeaORM Entity for the participants table, linking users to conversations.

use crate::participant_role::ParticipantRole;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "chat", table_name = "participants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[serde(skip_deserializing)]
    pub id: Id,
    pub conversation_id: Id,
    pub user_id: Id,
    pub role: ParticipantRole,
    #[serde(skip_deserializing)]
    pub joined_at: DateTimeWithTimeZone,
    /// Read watermark; only ever moves forward.
    pub last_read_at: Option<DateTimeWithTimeZone>,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub is_archived: bool,
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
}

impl Related<super::conversations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
