use crate::message::Event;
use crate::Hub;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles domain events by converting them to hub events and broadcasting
/// them to the conversation's current participants.
///
/// The domain layer names the conversation and, for message echoes, the user
/// to skip. Recipients themselves are resolved by the hub at delivery time.
pub struct HubDomainEventHandler {
    hub: Arc<Hub>,
}

impl HubDomainEventHandler {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventHandler for HubDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        let conversation_id = event.conversation_id();

        let (hub_event, exclude_user_id) = match event {
            DomainEvent::MessageSent {
                message,
                exclude_user_id,
                ..
            } => (
                Event::MessageSent {
                    message: message.clone(),
                },
                *exclude_user_id,
            ),

            DomainEvent::MessageUpdated {
                message,
                exclude_user_id,
                ..
            } => (
                Event::MessageUpdated {
                    message: message.clone(),
                },
                *exclude_user_id,
            ),

            DomainEvent::MessageDeleted {
                message_id, reason, ..
            } => (
                Event::MessageDeleted {
                    message_id: *message_id,
                    reason: *reason,
                },
                None,
            ),

            DomainEvent::MessageDelivered {
                message_id,
                recipient_id,
                delivered_at,
                ..
            } => (
                Event::MessageDelivered {
                    message_id: *message_id,
                    recipient_id: *recipient_id,
                    delivered_at: *delivered_at,
                },
                Some(*recipient_id),
            ),

            DomainEvent::MessagesRead {
                reader_id,
                message_ids,
                last_read_at,
                ..
            } => (
                Event::MessageRead {
                    reader_id: *reader_id,
                    message_ids: message_ids.clone(),
                    last_read_at: *last_read_at,
                },
                None,
            ),

            DomainEvent::ReactionAdded {
                message_id,
                user_id,
                reaction_type,
                ..
            } => (
                Event::ReactionAdded {
                    message_id: *message_id,
                    user_id: *user_id,
                    reaction_type: reaction_type.clone(),
                },
                None,
            ),

            DomainEvent::ReactionRemoved {
                message_id,
                user_id,
                reaction_type,
                ..
            } => (
                Event::ReactionRemoved {
                    message_id: *message_id,
                    user_id: *user_id,
                    reaction_type: reaction_type.clone(),
                },
                None,
            ),

            DomainEvent::ConversationCreated { conversation, .. } => (
                Event::ConversationCreated {
                    conversation: conversation.clone(),
                },
                None,
            ),

            DomainEvent::ConversationUpdated { conversation, .. } => (
                Event::ConversationUpdated {
                    conversation: conversation.clone(),
                },
                None,
            ),

            DomainEvent::ParticipantJoined { user_id, role, .. } => (
                Event::ParticipantJoined {
                    user_id: *user_id,
                    role: role.clone(),
                },
                None,
            ),

            DomainEvent::ParticipantLeft { user_id, .. } => {
                // The leaver is no longer resolved as a participant, so they
                // are told directly.
                let left = Event::ParticipantLeft { user_id: *user_id };
                self.hub
                    .broadcast_to_user(*user_id, left.clone(), Some(conversation_id))
                    .await;
                (left, None)
            }
        };

        debug!("Handling domain event for conversation {conversation_id}");
        self.hub
            .broadcast_to_conversation(conversation_id, hub_event, exclude_user_id)
            .await;
    }
}
