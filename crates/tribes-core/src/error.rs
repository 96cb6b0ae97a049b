//! Error types for tribes-core

use std::time::Duration;

use thiserror::Error;

use crate::models::{ConflictId, ListId, ListItem};

/// Result type alias using tribes-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tribes-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Entity not found (or soft-deleted)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Actor is not allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unique constraint hit; carries the row that already exists
    #[error("An item named '{}' already exists in this list", .0.name)]
    Duplicate(Box<ListItem>),

    /// Sync requested for a list without a sync source
    #[error("Sync is not enabled for list {0}")]
    SyncDisabled(ListId),

    /// External source could not be reached
    #[error("External source unavailable: {0}")]
    ExternalSourceUnavailable(String),

    /// External source did not answer in time
    #[error("External source timed out after {0:?}")]
    ExternalSourceTimeout(Duration),

    /// External source answered with an error
    #[error("External source error: {0}")]
    ExternalSourceError(String),

    /// Conflict does not exist for the given list
    #[error("Sync conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    /// Conflict was closed earlier
    #[error("Sync conflict already resolved: {0}")]
    ConflictAlreadyResolved(ConflictId),

    /// Resolution outside the accepted vocabulary
    #[error("Invalid resolution '{0}' (expected accept_local or accept_remote)")]
    InvalidResolution(String),

    /// Write carried a stale version
    #[error("Version conflict on {entity} {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: i64,
        actual: i64,
    },

    /// The request was cancelled; nothing was applied
    #[error("Operation cancelled")]
    Cancelled,

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }

    /// Storage or other failures whose details must not reach end users
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Sqlite(_) | Self::Io(_) | Self::Serialization(_)
        )
    }

    /// Whether retrying the same call later may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalSourceUnavailable(_) | Self::ExternalSourceTimeout(_)
        )
    }

    /// Message suitable for showing to the end user
    pub fn user_message(&self) -> String {
        if self.is_internal() {
            "Something went wrong on our side. Please try again.".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Whether a rusqlite error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
