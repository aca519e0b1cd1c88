//! WebSocket transport between clients and the hub.
//!
//! The hub owns connection state; this module only pumps frames. Outbound
//! envelopes are drained from the connection's bounded queue by a writer
//! task, inbound frames are parsed and dispatched to the hub or the domain.

pub(crate) mod handler;
pub(crate) mod inbound;
