use crate::connection::{ConversationId, UserId};
use crate::presence::PresenceState;
use chrono::{DateTime, Utc};
use events::{DeletionReason, Id};
use serde::Serialize;
use serde_json::Value;

/// Trait for getting the wire name of an event
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// Every event a client can receive. Serialized adjacently tagged as
/// `{"type": "MESSAGE_SENT", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    // Messages (conversation-scoped)
    MessageSent {
        message: Value,
    },
    MessageUpdated {
        message: Value,
    },
    MessageDeleted {
        message_id: Id,
        reason: DeletionReason,
    },
    MessageDelivered {
        message_id: Id,
        recipient_id: UserId,
        delivered_at: DateTime<Utc>,
    },
    MessageRead {
        reader_id: UserId,
        message_ids: Vec<Id>,
        last_read_at: DateTime<Utc>,
    },

    // Reactions
    ReactionAdded {
        message_id: Id,
        user_id: UserId,
        reaction_type: String,
    },
    ReactionRemoved {
        message_id: Id,
        user_id: UserId,
        reaction_type: String,
    },

    // Ephemeral signals
    TypingStart {
        user_id: UserId,
        user_name: String,
    },
    TypingStop {
        user_id: UserId,
        user_name: String,
    },
    PresenceChanged {
        user_id: UserId,
        presence: PresenceState,
    },

    // Conversations
    ConversationCreated {
        conversation: Value,
    },
    ConversationUpdated {
        conversation: Value,
    },
    ParticipantJoined {
        user_id: UserId,
        role: String,
    },
    ParticipantLeft {
        user_id: UserId,
    },

    /// Directed reply to a rejected client frame.
    Error {
        code: String,
        message: String,
    },
}

impl EventType for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::MessageSent { .. } => "MESSAGE_SENT",
            Event::MessageUpdated { .. } => "MESSAGE_UPDATED",
            Event::MessageDeleted { .. } => "MESSAGE_DELETED",
            Event::MessageDelivered { .. } => "MESSAGE_DELIVERED",
            Event::MessageRead { .. } => "MESSAGE_READ",
            Event::ReactionAdded { .. } => "REACTION_ADDED",
            Event::ReactionRemoved { .. } => "REACTION_REMOVED",
            Event::TypingStart { .. } => "TYPING_START",
            Event::TypingStop { .. } => "TYPING_STOP",
            Event::PresenceChanged { .. } => "PRESENCE_CHANGED",
            Event::ConversationCreated { .. } => "CONVERSATION_CREATED",
            Event::ConversationUpdated { .. } => "CONVERSATION_UPDATED",
            Event::ParticipantJoined { .. } => "PARTICIPANT_JOINED",
            Event::ParticipantLeft { .. } => "PARTICIPANT_LEFT",
            Event::Error { .. } => "ERROR",
        }
    }
}

/// The frame written to the socket: the tagged event, the conversation it
/// belongs to (absent for user-scoped events) and the emission time.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: Event,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(event: Event, conversation_id: Option<ConversationId>) -> Self {
        Self {
            event,
            conversation_id,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl EventType for Envelope {
    fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}
