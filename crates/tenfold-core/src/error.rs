//! Core error types for tenfold-core.
//!
//! Rejected user operations (`LimitExceeded`, `AlreadyCompleted`, `NotFound`)
//! are ordinary results for the caller to report back to the participant.
//! Store and delivery failures inside a batch are isolated per user by the
//! job runner and never tear the process down.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for tenfold-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Referenced user, question or day record is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Question-change quota for the day is exhausted.
    #[error("question change limit reached ({limit} per day)")]
    LimitExceeded { limit: u32 },

    /// Mutation attempted on a completed or closed day record.
    #[error("day record for {date} is already finalized")]
    AlreadyCompleted { date: chrono::NaiveDate },

    /// Completion requested before the record reached the threshold.
    #[error("{answers} of {threshold} answers recorded")]
    BelowThreshold { answers: u32, threshold: u32 },

    /// The messaging transport reports the recipient blocked or deactivated.
    #[error("recipient {user_id} is unreachable")]
    RecipientUnreachable { user_id: i64 },

    /// Persistence layer failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),

    /// A blocking store task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The in-process handle was poisoned by a panicking holder.
    #[error("Database handle poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-separated key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Home/data directory could not be resolved or created
    #[error("data directory unavailable: {0}")]
    DataDir(String),
}

impl ConfigError {
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy
                ) =>
            {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::StoreUnavailable(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_surface_as_store_unavailable() {
        let err: CoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(
            err,
            CoreError::StoreUnavailable(DatabaseError::QueryFailed(_))
        ));
    }

    #[test]
    fn busy_database_is_classified_as_locked() {
        let raw = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(raw), DatabaseError::Locked));
    }

    #[test]
    fn limit_message_names_the_quota() {
        let err = CoreError::LimitExceeded { limit: 3 };
        assert_eq!(err.to_string(), "question change limit reached (3 per day)");
    }
}
