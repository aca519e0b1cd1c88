use std::error::Error as StdError;
use std::fmt;

/// Errors the hub reports to its callers. Delivery problems are never
/// surfaced here; they are logged and reflected in delivery counts.
#[derive(Debug)]
pub struct HubError {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: HubErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum HubErrorKind {
    /// A connection was registered under a user that does not own it.
    OwnerMismatch,
    /// The caller does not participate in the conversation.
    NotParticipant,
    /// A client-supplied value was rejected.
    Invalid(String),
    /// Membership could not be resolved.
    DirectoryUnavailable,
    ShuttingDown,
}

impl HubError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::from(HubErrorKind::Invalid(reason.into()))
    }

    pub(crate) fn directory(source: crate::directory::DirectoryError) -> Self {
        Self {
            source: Some(Box::new(source)),
            error_kind: HubErrorKind::DirectoryUnavailable,
        }
    }
}

impl From<HubErrorKind> for HubError {
    fn from(error_kind: HubErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_kind {
            HubErrorKind::OwnerMismatch => write!(f, "connection belongs to another user"),
            HubErrorKind::NotParticipant => write!(f, "not a participant of this conversation"),
            HubErrorKind::Invalid(reason) => write!(f, "{reason}"),
            HubErrorKind::DirectoryUnavailable => write!(f, "participant directory unavailable"),
            HubErrorKind::ShuttingDown => write!(f, "hub is shutting down"),
        }
    }
}

impl StdError for HubError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}
