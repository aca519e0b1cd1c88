//! Event system infrastructure for the team-chat core.
//!
//! This crate provides the event system that decouples the write paths
//! (conversation, message and reaction operations in `domain`) from the
//! real-time fan-out performed by the `hub` crate.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing every committed state change that live
//!   clients must hear about
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates (entity, domain, etc.),
//! avoiding circular dependencies. Entity data is carried as serialized JSON values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A type alias that represents any Entity's internal id field data type.
/// This matches the definition in the entity crate to maintain compatibility.
pub type Id = Uuid;

/// Why a message stopped being visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionReason {
    /// The original sender deleted it.
    Sender,
    /// Its ephemeral window elapsed.
    Expired,
}

impl fmt::Display for DeletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionReason::Sender => write!(f, "sender"),
            DeletionReason::Expired => write!(f, "expired"),
        }
    }
}

/// Domain events emitted after a write has been committed to the store.
///
/// Conversation-scoped events name the conversation and, where relevant, the
/// user whose own connections should not receive the echo (`exclude_user_id`).
/// The hub resolves the current participant set at delivery time, so a user
/// removed from a conversation stops receiving its events immediately.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A new message was persisted with status `sent`.
    MessageSent {
        conversation_id: Id,
        /// Complete serialized message entity.
        message: Value,
        /// The sender; their own devices already hold the message.
        exclude_user_id: Option<Id>,
    },
    /// Message content was edited.
    MessageUpdated {
        conversation_id: Id,
        message: Value,
        exclude_user_id: Option<Id>,
    },
    /// A message was tombstoned by its sender or hidden by the expiry sweeper.
    MessageDeleted {
        conversation_id: Id,
        message_id: Id,
        reason: DeletionReason,
    },
    /// A recipient device acknowledged receipt of a message.
    MessageDelivered {
        conversation_id: Id,
        message_id: Id,
        recipient_id: Id,
        delivered_at: DateTime<Utc>,
    },
    /// A participant advanced their read watermark.
    MessagesRead {
        conversation_id: Id,
        reader_id: Id,
        /// Messages that transitioned to `read` in this pass.
        message_ids: Vec<Id>,
        last_read_at: DateTime<Utc>,
    },
    ReactionAdded {
        conversation_id: Id,
        message_id: Id,
        user_id: Id,
        reaction_type: String,
    },
    ReactionRemoved {
        conversation_id: Id,
        message_id: Id,
        user_id: Id,
        reaction_type: String,
    },
    /// A conversation came into existence; every initial participant is notified.
    ConversationCreated {
        conversation_id: Id,
        conversation: Value,
    },
    /// Name or description of a group conversation changed.
    ConversationUpdated {
        conversation_id: Id,
        conversation: Value,
    },
    ParticipantJoined {
        conversation_id: Id,
        user_id: Id,
        role: String,
    },
    /// Delivered to the remaining participants and, directly, to the user who left.
    ParticipantLeft { conversation_id: Id, user_id: Id },
}

impl DomainEvent {
    /// The conversation every event is scoped to.
    pub fn conversation_id(&self) -> Id {
        match self {
            DomainEvent::MessageSent {
                conversation_id, ..
            }
            | DomainEvent::MessageUpdated {
                conversation_id, ..
            }
            | DomainEvent::MessageDeleted {
                conversation_id, ..
            }
            | DomainEvent::MessageDelivered {
                conversation_id, ..
            }
            | DomainEvent::MessagesRead {
                conversation_id, ..
            }
            | DomainEvent::ReactionAdded {
                conversation_id, ..
            }
            | DomainEvent::ReactionRemoved {
                conversation_id, ..
            }
            | DomainEvent::ConversationCreated {
                conversation_id, ..
            }
            | DomainEvent::ConversationUpdated {
                conversation_id, ..
            }
            | DomainEvent::ParticipantJoined {
                conversation_id, ..
            }
            | DomainEvent::ParticipantLeft {
                conversation_id, ..
            } => *conversation_id,
        }
    }
}

/// Trait for handling domain events.
/// Implementations perform side effects like pushing real-time updates.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers never fail from the publisher's point of view; each one is
    /// responsible for logging its own delivery problems.
    pub async fn publish(&self, event: DomainEvent) {
        trace!(
            "Publishing domain event for conversation {}",
            event.conversation_id()
        );
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
