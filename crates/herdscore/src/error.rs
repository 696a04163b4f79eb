use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::RecordStatus;

#[derive(Error, Debug)]
pub enum HerdscoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] crate::workflow::WorkflowError),

    #[error("Sync error: {0}")]
    Sync(#[from] crate::sync::EngineError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid breed standard '{category}': {reason}")]
    InvalidStandard { category: String, reason: String },

    #[error("Invalid environment override {name}='{value}': {reason}")]
    InvalidOverride {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures while accepting a captured image.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Captured image is empty")]
    Empty,

    #[error("Captured image could not be decoded: {0}")]
    Undecodable(String),

    #[error("Failed to write image '{path}': {source}")]
    WriteImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image reference '{0}' escapes the image directory")]
    InvalidReference(String),
}

/// Failures reported by an analysis provider, or imposed on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The image cannot yield measurements; the operator must recapture.
    #[error("Image unusable: {0}")]
    ImageUnusable(String),

    #[error("Analysis provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered with values outside their valid ranges.
    #[error("Analysis result rejected: {0}")]
    InvalidResult(String),
}

impl AnalysisError {
    /// Transient failures worth another provider call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::ProviderUnavailable(_) | AnalysisError::Timeout(_)
        )
    }
}

/// Errors from the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record '{0}' not found")]
    NotFound(String),

    #[error("Record '{0}' already exists")]
    DuplicateId(String),

    /// The record changed between read and write.
    #[error("Record '{0}' was modified concurrently")]
    WriteConflict(String),

    #[error("Record '{id}' cannot move from {from:?} to {to:?}")]
    IllegalTransition {
        id: String,
        from: RecordStatus,
        to: RecordStatus,
    },

    #[error("Record '{id}' is {status:?} and cannot be edited")]
    ImmutableRecord { id: String, status: RecordStatus },

    #[error("Field '{field}' of record '{id}' cannot be changed")]
    ImmutableField { id: String, field: &'static str },

    #[error("Record '{id}' violates an invariant: {reason}")]
    InvariantViolation { id: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(crate::db::DatabaseError::Sqlite(e))
    }
}

/// Outcome of a failed submission to the remote endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network failures, timeouts and server-side errors.
    #[error("Transient sync failure: {0}")]
    Retryable(String),

    /// The remote refused the record as submitted.
    #[error("Remote rejected record: {0}")]
    Rejected(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Retryable(_))
    }

    /// Classifies an HTTP response status from a remote transport.
    ///
    /// 408, 429 and 5xx are transient; every other 4xx is a rejection.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, message.into());
        match status {
            408 | 429 | 500..=599 => SyncError::Retryable(message),
            _ => SyncError::Rejected(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, HerdscoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_retryability() {
        assert!(AnalysisError::ProviderUnavailable("offline".into()).is_retryable());
        assert!(AnalysisError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!AnalysisError::ImageUnusable("blurred".into()).is_retryable());
        assert!(!AnalysisError::InvalidResult("confidence 140".into()).is_retryable());
    }

    #[test]
    fn test_sync_error_from_http_status() {
        assert!(SyncError::from_http_status(503, "maintenance").is_retryable());
        assert!(SyncError::from_http_status(429, "slow down").is_retryable());
        assert!(SyncError::from_http_status(408, "timeout").is_retryable());
        assert_eq!(
            SyncError::from_http_status(422, "unknown breed"),
            SyncError::Rejected("HTTP 422: unknown breed".into())
        );
    }

    #[test]
    fn test_store_error_from_sqlite() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::IllegalTransition {
            id: "r1".into(),
            from: RecordStatus::Draft,
            to: RecordStatus::Synced,
        };
        assert_eq!(err.to_string(), "Record 'r1' cannot move from Draft to Synced");
    }
}
