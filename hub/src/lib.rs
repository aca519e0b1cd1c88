//! Real-time hub for the team-chat core.
//!
//! Keeps every live client connection in memory and pushes conversation
//! events, typing indicators and presence changes to them.
//!
//! # Architecture
//!
//! - **Many connections per user**: every device of a user holds its own
//!   connection; user-scoped events reach all of them.
//! - **Dual-index registry**: connections by id, and per user the connection
//!   set together with the derived presence (`ONLINE`, `AWAY`, `OFFLINE`).
//! - **Recipients resolved at delivery time**: conversation broadcasts ask a
//!   [`ParticipantDirectory`] for the current participants, so membership
//!   changes apply to the very next event.
//! - **Bounded, non-blocking delivery**: each connection owns a bounded
//!   queue. A connection whose queue is full or closed is torn down; the
//!   broadcast itself never waits and never fails.
//! - **Per-conversation ordering**: broadcasts to one conversation are
//!   serialized, so every recipient sees them in emission order.
//! - **Ephemeral signals**: typing indicators expire on their own after a
//!   TTL, and a user's indicators disappear with their last connection.
//!
//! # Message Flow
//!
//! 1. The transport authenticates the client, opens a [`Connection`] and
//!    registers it once it is ready to drain the receiver.
//! 2. A write path commits a change and publishes a `DomainEvent`.
//! 3. [`HubDomainEventHandler`] converts it into an [`Event`] and calls
//!    [`Hub::broadcast_to_conversation`].
//! 4. The hub resolves participants, skips the excluded user and queues one
//!    shared [`Envelope`] per connection.
//! 5. The transport's write loop serializes the envelope onto the socket.
//!
//! # Modules
//!
//! - `connection`: `ConnectionRegistry`, `Connection` and `ConnectionId`
//! - `directory`: the membership seam
//! - `manager`: `Hub`, fan-out, presence announcements and typing timers
//! - `message`: wire events and the envelope
//! - `presence`: presence states and transitions
//! - `typing`: typing indicator store

pub mod connection;
pub mod directory;
pub mod domain_event_handler;
pub mod error;
pub mod manager;
pub mod message;
pub mod presence;
pub mod typing;

pub use connection::{Connection, ConnectionId, ConnectionReceiver};
pub use directory::{DirectoryError, ParticipantDirectory};
pub use domain_event_handler::HubDomainEventHandler;
pub use error::{HubError, HubErrorKind};
pub use manager::{Delivery, Hub, HubConfig};
pub use message::{Envelope, Event, EventType};
pub use presence::PresenceState;
