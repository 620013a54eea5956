//! Error types for the durable store.

use carelink_core::ChatError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(String),

    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    Missing {
        /// Table-level entity name.
        entity: &'static str,
        /// The ID that was looked up.
        id: String,
    },
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing { entity, id } => Self::NotFound(format!("{entity} {id}")),
            other => Self::TransientStore(other.to_string()),
        }
    }
}
