use uuid::Uuid;

pub mod prelude;

// Core entities
pub mod conversations;
pub mod messages;
pub mod participants;
pub mod reactions;

// Enumerations stored as text columns
pub mod conversation_type;
pub mod deletion_reason;
pub mod message_status;
pub mod participant_role;

/// A type alias that represents any Entity's internal id field data type.
/// Aliased so that it's easy to change the underlying type if necessary.
pub type Id = Uuid;

/// Content stored in place of a message body once it has been deleted or has expired.
pub const TOMBSTONE: &str = "[message deleted]";
