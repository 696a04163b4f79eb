//! Record lifecycle states and the transition graph between them.

use serde::{Deserialize, Serialize};

/// Synchronization lifecycle state of a classification record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Not yet committed; freely editable by the operator.
    Draft,
    /// Committed and waiting for the sync engine.
    PendingSync,
    /// A sync attempt is in flight.
    Syncing,
    /// Acknowledged by the remote system of record.
    Synced,
    /// The last sync attempt failed; see the record's failure kind.
    SyncFailed,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 5] = [
        RecordStatus::Draft,
        RecordStatus::PendingSync,
        RecordStatus::Syncing,
        RecordStatus::Synced,
        RecordStatus::SyncFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::PendingSync => "pending_sync",
            RecordStatus::Syncing => "syncing",
            RecordStatus::Synced => "synced",
            RecordStatus::SyncFailed => "sync_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(RecordStatus::Draft),
            "pending_sync" => Some(RecordStatus::PendingSync),
            "syncing" => Some(RecordStatus::Syncing),
            "synced" => Some(RecordStatus::Synced),
            "sync_failed" => Some(RecordStatus::SyncFailed),
            _ => None,
        }
    }

    /// Returns true if `next` is reachable from `self` in one step.
    ///
    /// `Draft -> Draft` covers analysis completion, operator edits and
    /// recapture. Every other self-loop is rejected: committed records are
    /// not edited in place.
    pub fn can_transition_to(self, next: RecordStatus) -> bool {
        use RecordStatus::*;
        matches!(
            (self, next),
            (Draft, Draft)
                | (Draft, PendingSync)
                | (PendingSync, Syncing)
                | (Syncing, Synced)
                | (Syncing, SyncFailed)
                | (SyncFailed, PendingSync)
                | (Synced, Draft)
        )
    }

    /// Committed records belong to the sync engine.
    pub fn is_committed(self) -> bool {
        !matches!(self, RecordStatus::Draft)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Draft => write!(f, "Draft"),
            RecordStatus::PendingSync => write!(f, "Pending sync"),
            RecordStatus::Syncing => write!(f, "Syncing"),
            RecordStatus::Synced => write!(f, "Synced"),
            RecordStatus::SyncFailed => write!(f, "Sync failed"),
        }
    }
}

/// Why the last sync attempt of a `SyncFailed` record did not succeed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or server-side failure; retried on the backoff schedule.
    Retryable,
    /// The remote refused the record; waits for a manual retry.
    Rejected,
    /// The attempt was cancelled or the process stopped mid-attempt.
    Interrupted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Retryable => "retryable",
            FailureKind::Rejected => "rejected",
            FailureKind::Interrupted => "interrupted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "retryable" => Some(FailureKind::Retryable),
            "rejected" => Some(FailureKind::Rejected),
            "interrupted" => Some(FailureKind::Interrupted),
            _ => None,
        }
    }
}
