use crate::error::{HubError, HubErrorKind};
use crate::message::Envelope;
use crate::presence::{PresenceChange, PresenceState, UserPresence};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::*;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;

pub type UserId = events::Id;
pub type ConversationId = events::Id;

/// Outbound frames are shared between every connection they fan out to.
pub type Outbound = Arc<Envelope>;

/// Receiving half handed to the transport's write loop.
pub type ConnectionReceiver = mpsc::Receiver<Outbound>;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One live client session of one user.
///
/// The sending half of a bounded queue; the transport drains the matching
/// [`ConnectionReceiver`] onto the socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::Sender<Outbound>,
}

impl Connection {
    /// Opens a connection for `user_id` whose queue holds at most `capacity` frames.
    pub fn open(user_id: UserId, capacity: usize) -> (Self, ConnectionReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                user_id,
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Enqueues without waiting. A full or closed queue means the
    /// connection can no longer keep up and must be torn down.
    fn try_deliver(&self, frame: &Outbound) -> bool {
        match self.sender.try_send(Arc::clone(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue of connection {} is full", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound queue of connection {} is closed", self.id);
                false
            }
        }
    }
}

/// Result of pushing one frame to every connection of a user.
#[derive(Debug, Default)]
pub(crate) struct UserFanout {
    pub(crate) delivered: usize,
    pub(crate) failed: Vec<ConnectionId>,
}

/// Connection registry with dual indices.
///
/// The user index doubles as presence storage: an entry exists exactly while
/// the user holds at least one connection. Lookups copy connection ids out of
/// the user index before touching the primary map, so no two shard locks are
/// ever held at once.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for delivery and cleanup
    connections: DashMap<ConnectionId, Connection>,

    /// Secondary index: a user's connections and presence
    user_index: DashMap<UserId, UserPresence>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
        }
    }

    /// Adds a connection. Returns the presence change the first connection
    /// of a user (or the first after going away) causes.
    pub fn register(
        &self,
        user_id: UserId,
        connection: Connection,
        now: Instant,
    ) -> Result<Option<PresenceChange>, HubError> {
        if connection.user_id != user_id {
            return Err(HubError::from(HubErrorKind::OwnerMismatch));
        }

        let connection_id = connection.id;
        self.connections.insert(connection_id, connection);

        let change = self
            .user_index
            .entry(user_id)
            .or_insert_with(|| UserPresence::new(user_id, now))
            .attach(connection_id, now);

        Ok(change)
    }

    /// Removes a connection owned by `user_id`. Unknown ids and ids owned by
    /// another user are ignored, so repeated calls are harmless.
    pub fn unregister(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<PresenceChange> {
        self.connections
            .remove_if(&connection_id, |_, connection| connection.user_id == user_id)?;
        self.detach(user_id, connection_id)
    }

    /// Removes a connection by id alone, reporting its owner.
    pub(crate) fn evict(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(UserId, Option<PresenceChange>)> {
        let (_, connection) = self.connections.remove(&connection_id)?;
        let user_id = connection.user_id;
        Some((user_id, self.detach(user_id, connection_id)))
    }

    fn detach(&self, user_id: UserId, connection_id: ConnectionId) -> Option<PresenceChange> {
        match self.user_index.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let change = entry.get_mut().detach(connection_id);
                if entry.get().is_empty() {
                    entry.remove();
                }
                change
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Sends a frame to every connection of a user and reports the ones that failed.
    pub(crate) fn send_to_user(&self, user_id: UserId, frame: &Outbound) -> UserFanout {
        let connection_ids = match self.user_index.get(&user_id) {
            Some(entry) => entry.connection_ids(),
            None => return UserFanout::default(),
        };

        let mut fanout = UserFanout::default();
        for connection_id in connection_ids {
            let delivered = self
                .connections
                .get(&connection_id)
                .map(|connection| connection.try_deliver(frame));
            match delivered {
                Some(true) => fanout.delivered += 1,
                Some(false) => fanout.failed.push(connection_id),
                // Unregistered between the index read and the send.
                None => {}
            }
        }
        fanout
    }

    /// Sends a frame to one connection. `None` when the connection is unknown.
    pub(crate) fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        frame: &Outbound,
    ) -> Option<bool> {
        self.connections
            .get(&connection_id)
            .map(|connection| connection.try_deliver(frame))
    }

    pub fn presence(&self, user_id: UserId) -> PresenceState {
        self.user_index
            .get(&user_id)
            .map(|entry| entry.state())
            .unwrap_or(PresenceState::Offline)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.user_index
            .get(&user_id)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn record_activity(&self, user_id: UserId, now: Instant) -> Option<PresenceChange> {
        self.user_index.get_mut(&user_id)?.touch(now)
    }

    /// Moves every user idle for at least `away_after` from `Online` to `Away`.
    pub(crate) fn mark_idle(&self, now: Instant, away_after: Duration) -> Vec<PresenceChange> {
        self.user_index
            .iter_mut()
            .filter_map(|mut entry| entry.value_mut().idle_check(now, away_after))
            .collect()
    }

    /// Drops every connection, closing their queues. Presence entries go with them.
    pub(crate) fn close_all(&self) -> usize {
        let closed = self.connections.len();
        self.connections.clear();
        self.user_index.clear();
        closed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
