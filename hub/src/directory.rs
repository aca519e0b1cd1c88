use crate::connection::{ConversationId, UserId};
use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;

/// Authoritative membership data the hub consults at delivery time.
///
/// Recipients are resolved on every broadcast, so membership changes take
/// effect on the next event without any cache invalidation.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// Current participants of a conversation.
    async fn participant_ids(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<UserId>, DirectoryError>;

    /// Users sharing at least one conversation with `user_id`, excluding `user_id`.
    async fn contact_ids(&self, user_id: UserId) -> Result<Vec<UserId>, DirectoryError>;
}

#[derive(Debug)]
pub struct DirectoryError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl DirectoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for DirectoryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Membership held in memory, editable while a test runs.
    #[derive(Default)]
    pub(crate) struct InMemoryDirectory {
        members: Mutex<HashMap<ConversationId, Vec<UserId>>>,
    }

    impl InMemoryDirectory {
        pub(crate) fn with_conversation(
            self,
            conversation_id: ConversationId,
            users: &[UserId],
        ) -> Self {
            self.members
                .lock()
                .unwrap()
                .insert(conversation_id, users.to_vec());
            self
        }

        pub(crate) fn remove(&self, conversation_id: ConversationId, user_id: UserId) {
            if let Some(users) = self.members.lock().unwrap().get_mut(&conversation_id) {
                users.retain(|id| *id != user_id);
            }
        }
    }

    #[async_trait]
    impl ParticipantDirectory for InMemoryDirectory {
        async fn participant_ids(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Vec<UserId>, DirectoryError> {
            Ok(self
                .members
                .lock()
                .unwrap()
                .get(&conversation_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn contact_ids(&self, user_id: UserId) -> Result<Vec<UserId>, DirectoryError> {
            let members = self.members.lock().unwrap();
            let mut contacts: Vec<UserId> = members
                .values()
                .filter(|users| users.contains(&user_id))
                .flatten()
                .copied()
                .filter(|id| *id != user_id)
                .collect();
            contacts.sort();
            contacts.dedup();
            Ok(contacts)
        }
    }
}
