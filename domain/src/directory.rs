//! Participant lookups for the hub, answered from the participants table.

use crate::Id;
use async_trait::async_trait;
use entity_api::participant as participant_api;
use hub::{DirectoryError, ParticipantDirectory};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub struct DbParticipantDirectory {
    db: Arc<DatabaseConnection>,
}

impl DbParticipantDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ParticipantDirectory for DbParticipantDirectory {
    async fn participant_ids(&self, conversation_id: Id) -> Result<Vec<Id>, DirectoryError> {
        participant_api::find_user_ids_by_conversation_id(self.db.as_ref(), conversation_id)
            .await
            .map_err(|e| {
                DirectoryError::with_source(
                    format!("resolving participants of conversation {conversation_id}"),
                    e,
                )
            })
    }

    async fn contact_ids(&self, user_id: Id) -> Result<Vec<Id>, DirectoryError> {
        participant_api::find_contact_ids(self.db.as_ref(), user_id)
            .await
            .map_err(|e| DirectoryError::with_source(format!("resolving contacts of {user_id}"), e))
    }
}
