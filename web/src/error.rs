use std::error::Error as StdError;

use domain::error::{DomainErrorKind, EntityErrorKind, Error as DomainError, InternalErrorKind};
use hub::{Event, HubError, HubErrorKind};

pub type Result<T> = core::result::Result<T, Error>;

/// A rejected inbound frame, answered on the offending connection only.
#[derive(Debug)]
pub enum Error {
    Domain(DomainError),
    Hub(HubError),
    /// The frame was not valid JSON or named no known type.
    Malformed(serde_json::Error),
}

/// Codes carried by `ERROR` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    Invalid,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Invalid => "invalid",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Internal => "internal",
        }
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Domain(err) => match &err.error_kind {
                DomainErrorKind::Internal(internal_error_kind) => match internal_error_kind {
                    InternalErrorKind::Entity(entity_error_kind) => match entity_error_kind {
                        EntityErrorKind::NotFound => ErrorCode::NotFound,
                        EntityErrorKind::Invalid => ErrorCode::Invalid,
                        EntityErrorKind::DbTransaction | EntityErrorKind::Other(_) => {
                            ErrorCode::Internal
                        }
                    },
                    InternalErrorKind::Conflict(_) => ErrorCode::Conflict,
                    InternalErrorKind::Validation(_) => ErrorCode::Invalid,
                    InternalErrorKind::Forbidden(_) => ErrorCode::Forbidden,
                    InternalErrorKind::Other(_) => ErrorCode::Internal,
                },
            },
            Error::Hub(err) => match err.error_kind {
                HubErrorKind::Invalid(_) => ErrorCode::Invalid,
                HubErrorKind::NotParticipant | HubErrorKind::OwnerMismatch => ErrorCode::Forbidden,
                HubErrorKind::DirectoryUnavailable | HubErrorKind::ShuttingDown => {
                    ErrorCode::Internal
                }
            },
            Error::Malformed(_) => ErrorCode::Invalid,
        }
    }

    /// The directed `ERROR` frame for this rejection. Internal details stay
    /// in the server log.
    pub fn into_event(self) -> Event {
        let code = self.code();
        let message = match (&self, code) {
            (_, ErrorCode::Internal) => "internal error".to_owned(),
            (_, ErrorCode::NotFound) => "not found".to_owned(),
            (Error::Malformed(err), _) => format!("malformed frame: {err}"),
            (err, _) => err.to_string(),
        };
        Event::Error {
            code: code.as_str().to_owned(),
            message,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::Domain(err) => write!(fmt, "{err}"),
            Error::Hub(err) => write!(fmt, "{err}"),
            Error::Malformed(err) => write!(fmt, "{err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Domain(err) => Some(err),
            Error::Hub(err) => Some(err),
            Error::Malformed(err) => Some(err),
        }
    }
}

impl From<DomainError> for Error {
    fn from(err: DomainError) -> Self {
        Error::Domain(err)
    }
}

impl From<HubError> for Error {
    fn from(err: HubError) -> Self {
        Error::Hub(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Malformed(err)
    }
}
