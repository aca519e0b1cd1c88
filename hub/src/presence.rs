//! Presence derived from a user's live connections and activity.
//!
//! A user's presence lives in the same registry entry as their connection
//! set, so `Offline` holds exactly when that set is empty.

use crate::connection::{ConnectionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceState {
    Online,
    Away,
    Offline,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceState::Online => write!(f, "ONLINE"),
            PresenceState::Away => write!(f, "AWAY"),
            PresenceState::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// A presence transition that must be announced to the user's contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    pub user_id: UserId,
    pub from: PresenceState,
    pub to: PresenceState,
}

/// Per-user registry entry: open connections plus derived presence.
#[derive(Debug)]
pub(crate) struct UserPresence {
    user_id: UserId,
    connections: HashSet<ConnectionId>,
    state: PresenceState,
    last_activity: Instant,
}

impl UserPresence {
    pub(crate) fn new(user_id: UserId, now: Instant) -> Self {
        Self {
            user_id,
            connections: HashSet::new(),
            state: PresenceState::Offline,
            last_activity: now,
        }
    }

    pub(crate) fn state(&self) -> PresenceState {
        self.state
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().copied().collect()
    }

    /// A new connection is activity: `Offline` and `Away` both become `Online`.
    pub(crate) fn attach(&mut self, connection_id: ConnectionId, now: Instant) -> Option<PresenceChange> {
        self.connections.insert(connection_id);
        self.last_activity = now;
        self.transition(PresenceState::Online)
    }

    pub(crate) fn detach(&mut self, connection_id: ConnectionId) -> Option<PresenceChange> {
        if !self.connections.remove(&connection_id) || !self.connections.is_empty() {
            return None;
        }
        self.transition(PresenceState::Offline)
    }

    pub(crate) fn touch(&mut self, now: Instant) -> Option<PresenceChange> {
        self.last_activity = now;
        if self.connections.is_empty() {
            return None;
        }
        self.transition(PresenceState::Online)
    }

    /// `Online → Away` once nothing happened for `away_after`.
    pub(crate) fn idle_check(&mut self, now: Instant, away_after: Duration) -> Option<PresenceChange> {
        if self.state != PresenceState::Online
            || now.saturating_duration_since(self.last_activity) < away_after
        {
            return None;
        }
        self.transition(PresenceState::Away)
    }

    fn transition(&mut self, to: PresenceState) -> Option<PresenceChange> {
        if self.state == to {
            return None;
        }
        let from = std::mem::replace(&mut self.state, to);
        Some(PresenceChange {
            user_id: self.user_id,
            from,
            to,
        })
    }
}
