//! Short-lived "user is typing" indicators keyed by `(conversation, user)`.
//!
//! Every start or refresh stamps the entry with a fresh generation and a new
//! expiry timer token. A timer only removes the entry it was armed for, so a
//! refresh that lands while an older timer fires keeps the indicator alive.

use crate::connection::{ConversationId, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

pub(crate) type TypingKey = (ConversationId, UserId);

#[derive(Debug)]
struct TypingEntry {
    user_name: String,
    generation: u64,
    timer: CancellationToken,
}

/// Outcome of a start or refresh; the caller arms the expiry timer.
#[derive(Debug)]
pub(crate) struct TypingStarted {
    /// `false` when an indicator was already showing and only got refreshed.
    pub(crate) is_new: bool,
    pub(crate) generation: u64,
    pub(crate) timer: CancellationToken,
}

#[derive(Debug, Default)]
pub struct TypingStore {
    entries: DashMap<TypingKey, TypingEntry>,
    next_generation: AtomicU64,
}

impl TypingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts or refreshes an indicator. The previous timer, if any, is cancelled.
    pub(crate) fn start(
        &self,
        key: TypingKey,
        user_name: &str,
        parent: &CancellationToken,
    ) -> TypingStarted {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timer = parent.child_token();
        let entry = TypingEntry {
            user_name: user_name.to_owned(),
            generation,
            timer: timer.clone(),
        };

        let is_new = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let previous = std::mem::replace(occupied.get_mut(), entry);
                previous.timer.cancel();
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        };

        TypingStarted {
            is_new,
            generation,
            timer,
        }
    }

    /// Explicit stop. Returns the display name when an indicator was showing.
    pub(crate) fn stop(&self, key: TypingKey) -> Option<String> {
        self.entries.remove(&key).map(|(_, entry)| {
            entry.timer.cancel();
            entry.user_name
        })
    }

    /// Timer expiry. Only removes the entry armed with `generation`.
    pub(crate) fn expire(&self, key: TypingKey, generation: u64) -> Option<String> {
        self.entries
            .remove_if(&key, |_, entry| entry.generation == generation)
            .map(|(_, entry)| entry.user_name)
    }

    /// Stops every indicator of a user, returning the affected conversations.
    pub(crate) fn clear_user(&self, user_id: UserId) -> Vec<(ConversationId, String)> {
        let keys: Vec<TypingKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().1 == user_id)
            .map(|entry| *entry.key())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.stop(key).map(|user_name| (key.0, user_name)))
            .collect()
    }

    pub fn is_typing(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.entries.contains_key(&(conversation_id, user_id))
    }

    /// Users currently typing in a conversation.
    pub fn typing_users(&self, conversation_id: ConversationId) -> Vec<UserId> {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == conversation_id)
            .map(|entry| entry.key().1)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TypingKey {
        (ConversationId::new_v4(), UserId::new_v4())
    }

    #[test]
    fn refresh_is_not_new_and_cancels_the_previous_timer() {
        let store = TypingStore::new();
        let parent = CancellationToken::new();
        let key = key();

        let first = store.start(key, "Dana", &parent);
        let second = store.start(key, "Dana", &parent);

        assert!(first.is_new);
        assert!(!second.is_new);
        assert!(first.timer.is_cancelled());
        assert!(!second.timer.is_cancelled());
    }

    #[test]
    fn stale_generation_does_not_expire_a_refreshed_indicator() {
        let store = TypingStore::new();
        let parent = CancellationToken::new();
        let key = key();

        let first = store.start(key, "Dana", &parent);
        let second = store.start(key, "Dana", &parent);

        assert!(store.expire(key, first.generation).is_none());
        assert!(store.is_typing(key.0, key.1));
        assert_eq!(store.expire(key, second.generation).as_deref(), Some("Dana"));
        assert!(!store.is_typing(key.0, key.1));
    }

    #[test]
    fn stop_without_indicator_returns_none() {
        let store = TypingStore::new();
        assert!(store.stop(key()).is_none());
    }

    #[test]
    fn clear_user_only_touches_that_user() {
        let store = TypingStore::new();
        let parent = CancellationToken::new();
        let user_id = UserId::new_v4();
        let other = UserId::new_v4();
        let first = ConversationId::new_v4();
        let second = ConversationId::new_v4();
        store.start((first, user_id), "Dana", &parent);
        store.start((second, user_id), "Dana", &parent);
        store.start((first, other), "Lee", &parent);

        let mut cleared = store.clear_user(user_id);
        cleared.sort();

        let mut expected = vec![(first, "Dana".to_owned()), (second, "Dana".to_owned())];
        expected.sort();
        assert_eq!(cleared, expected);
        assert_eq!(store.typing_users(first), vec![other]);
    }

    #[test]
    fn cancelling_the_parent_cancels_every_timer() {
        let store = TypingStore::new();
        let parent = CancellationToken::new();
        let started = store.start(key(), "Dana", &parent);

        parent.cancel();

        assert!(started.timer.is_cancelled());
    }
}
