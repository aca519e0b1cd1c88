//! Error types for the `domain` layer.
use entity_api::error::{EntityApiErrorKind, Error as EntityApiError};
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field is used to hold the original error that caused
/// the domain error. The intent is to translate errors between layers while maintaining
/// layer boundaries. Ex. `domain` is dependent on `entity_api`, and `web` is dependent on `domain`.
/// but `web` should not be dependent, directly, on `entity_api`. Ultimately the various
/// `error_kind`s are used by `web` to answer the client with an appropriate error code.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
}

/// Enum representing the various kinds of internal errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Entity(EntityErrorKind),
    /// The request contradicts the current state (deleted message, duplicate member).
    Conflict(String),
    /// A client-supplied value is malformed or out of range.
    Validation(String),
    /// The caller may not perform the operation.
    Forbidden(String),
    Other(String),
}

/// Enum representing the various kinds of entity errors that can bubble up from the "Entity" layer (`entity_api` and `entity`).
/// These errors are translated from the `entity_api` layer to the `domain` layer and reduced to a subset of error kinds
/// that are relevant to the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum EntityErrorKind {
    NotFound,
    Invalid,
    DbTransaction,
    Other(String),
}

impl Error {
    fn internal(kind: InternalErrorKind) -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::Internal(kind),
        }
    }

    pub fn not_found() -> Self {
        Self::internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::internal(InternalErrorKind::Conflict(reason.into()))
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::internal(InternalErrorKind::Validation(reason.into()))
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::internal(InternalErrorKind::Forbidden(reason.into()))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            DomainErrorKind::Internal(InternalErrorKind::Conflict(reason))
            | DomainErrorKind::Internal(InternalErrorKind::Validation(reason))
            | DomainErrorKind::Internal(InternalErrorKind::Forbidden(reason)) => {
                write!(f, "{reason}")
            }
            _ => write!(f, "Domain Error: {self:?}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// This is where we translate errors from the `entity_api`` layer to the `domain`` layer.
impl From<EntityApiError> for Error {
    fn from(err: EntityApiError) -> Self {
        let internal_error_kind = match err.error_kind {
            EntityApiErrorKind::RecordNotFound => {
                InternalErrorKind::Entity(EntityErrorKind::NotFound)
            }
            EntityApiErrorKind::ValidationError => {
                InternalErrorKind::Entity(EntityErrorKind::Invalid)
            }
            EntityApiErrorKind::SystemError => {
                InternalErrorKind::Entity(EntityErrorKind::DbTransaction)
            }
            // A uniqueness constraint or a conditional update lost against a
            // concurrent write.
            EntityApiErrorKind::RecordConflict => {
                InternalErrorKind::Conflict("record already exists".to_string())
            }
            EntityApiErrorKind::RecordNotUpdated => {
                InternalErrorKind::Conflict("record changed concurrently".to_string())
            }
            EntityApiErrorKind::Other => {
                InternalErrorKind::Entity(EntityErrorKind::Other("EntityErrorKind".to_string()))
            }
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(internal_error_kind),
        }
    }
}

impl From<sea_orm::DbErr> for Error {
    fn from(err: sea_orm::DbErr) -> Self {
        EntityApiError::from(err).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "Failed to serialize event payload".to_string(),
            )),
        }
    }
}
