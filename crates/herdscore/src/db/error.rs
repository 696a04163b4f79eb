//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the data directory failed.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored row could not be decoded into its domain type.
    #[error("Corrupt row '{id}' in {table}: {reason}")]
    CorruptRow {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,
}
