//! Sync engine: delivers committed records to the remote system of record.
//!
//! Records move `PendingSync -> Syncing -> Synced | SyncFailed`. Failed
//! records are requeued on an exponential backoff schedule unless the
//! remote rejected them, in which case they wait for a manual retry.

use std::time::Duration;

use thiserror::Error;

use crate::error::StoreError;
use crate::model::RecordStatus;

pub mod backoff;
pub mod engine;
pub mod remote;
pub mod scheduler;

pub use engine::{AttemptOutcome, SyncEngine, SyncReport};
pub use remote::{InMemoryRemote, RemoteEndpoint, SubmitAck, SyncPayload};
pub use scheduler::SyncHandle;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Record '{id}' is {status} and cannot be retried")]
    NotRetryable { id: String, status: RecordStatus },

    #[error("Sync scheduler task failed: {0}")]
    Scheduler(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Maximum attempts in flight at once.
    pub concurrency: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for a single remote submission.
    pub attempt_timeout: Duration,
    /// Period of automatic passes.
    pub interval: Duration,
    /// Run passes on the interval and after commits. Manual passes work either way.
    pub auto_sync: bool,
    /// Failure count at which a record is flagged for operator attention.
    pub attention_threshold: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
            attempt_timeout: Duration::from_secs(30),
            interval: Duration::from_secs(60),
            auto_sync: true,
            attention_threshold: 5,
        }
    }
}
