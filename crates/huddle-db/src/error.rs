use rusqlite::ErrorCode;
use thiserror::Error;

/// Failure kinds surfaced by every store operation.
///
/// All of them are terminal for the request that triggered them. Nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Referenced entity is absent. Soft-deleted messages count as absent.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate membership, username or email.
    #[error("{0}")]
    Conflict(String),

    /// Actor is not the owning party.
    #[error("{0}")]
    Forbidden(String),

    /// Credentials did not match.
    #[error("{0}")]
    Unauthenticated(String),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

/// True when SQLite rejected a write because of a UNIQUE or PRIMARY KEY index.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}
