//! Chat domain: conversations, messages, reactions and ephemeral expiry.
//!
//! Every operation takes the caller's [`identity::Identity`], validates the
//! request, performs its writes through `entity_api` and then publishes a
//! [`events::DomainEvent`] for the real-time hub. Consumers of this crate do
//! not need to depend on `entity_api` directly: the entity modules it exposes
//! are re-exported here.

// Re-exports from `entity` crate via `entity_api`
pub use entity_api::{
    conversation_type, conversations, deletion_reason, message_status, messages,
    participant_role, participants, reactions, Id, TOMBSTONE,
};
pub use events;

pub mod conversation;
pub mod delivery;
pub mod directory;
pub mod ephemeral;
pub mod error;
pub mod identity;
pub mod message;
pub mod reaction;

#[cfg(test)]
#[cfg(feature = "mock")]
pub(crate) mod test_support;
