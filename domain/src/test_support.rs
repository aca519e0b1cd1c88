//! Fixtures shared by the store-backed tests.

use crate::conversation_type::ConversationType;
use crate::message_status::MessageStatus;
use crate::participant_role::ParticipantRole;
use crate::{conversations, messages, participants, Id};
use async_trait::async_trait;
use chrono::Utc;
use events::{DomainEvent, EventHandler};
use sea_orm::MockExecResult;
use std::sync::Mutex;

/// Keeps every published event for later assertions.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingHandler {
    pub(crate) fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &DomainEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub(crate) fn exec(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

pub(crate) fn conversation(
    tenant_id: Id,
    conversation_type: ConversationType,
) -> conversations::Model {
    let now = Utc::now();
    conversations::Model {
        id: Id::new_v4(),
        tenant_id,
        conversation_type,
        name: (conversation_type != ConversationType::Direct).then(|| "Service desk".to_owned()),
        description: None,
        direct_key: None,
        created_by: Id::new_v4(),
        created_at: now.into(),
        updated_at: now.into(),
    }
}

pub(crate) fn participant(
    conversation_id: Id,
    user_id: Id,
    role: ParticipantRole,
) -> participants::Model {
    participants::Model {
        id: Id::new_v4(),
        conversation_id,
        user_id,
        role,
        joined_at: Utc::now().into(),
        last_read_at: None,
        is_muted: false,
        is_pinned: false,
        is_archived: false,
    }
}

pub(crate) fn message(conversation_id: Id, sender_id: Id, status: MessageStatus) -> messages::Model {
    let now = Utc::now();
    messages::Model {
        id: Id::new_v4(),
        conversation_id,
        sender_id,
        content: "Parts arrived this morning".to_owned(),
        status,
        reply_to_id: None,
        is_edited: false,
        edited_at: None,
        delivered_at: None,
        read_at: None,
        ephemeral_seconds: None,
        ephemeral_expires_at: None,
        deleted_at: None,
        deletion_reason: None,
        created_at: now.into(),
        updated_at: now.into(),
    }
}
