//! Persistence operations over the `chat` schema.
//!
//! Every write whose legality depends on current state (delivery status,
//! read watermark, deletion) is issued as a conditional update so that
//! concurrent requests can never regress a row.

pub use entity::{
    conversation_type, conversations, deletion_reason, message_status, messages,
    participant_role, participants, reactions, Id, TOMBSTONE,
};

pub mod conversation;
pub mod error;
pub mod message;
pub mod participant;
pub mod reaction;
