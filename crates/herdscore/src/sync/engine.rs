//! Sync passes and per-record attempts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::backoff;
use super::remote::{RemoteEndpoint, SubmitAck, SyncPayload};
use super::{EngineError, SyncSettings};
use crate::error::{StoreError, SyncError};
use crate::model::{ClassificationRecord, FailureKind, RecordStatus};
use crate::query;
use crate::store::{timestamp_now, RecordStore};

/// Result of one record's attempt within a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Synced {
        record_id: String,
        remote_id: String,
        already_existed: bool,
    },
    Failed {
        record_id: String,
        kind: FailureKind,
        error: String,
    },
    /// Another attempt owned the record, it changed state first, or
    /// shutdown began before it was claimed.
    Skipped { record_id: String },
    /// The outcome could not be persisted; the record is recovered on the
    /// next start.
    StoreFailed { record_id: String, error: String },
}

impl AttemptOutcome {
    pub fn record_id(&self) -> &str {
        match self {
            AttemptOutcome::Synced { record_id, .. }
            | AttemptOutcome::Failed { record_id, .. }
            | AttemptOutcome::Skipped { record_id }
            | AttemptOutcome::StoreFailed { record_id, .. } => record_id,
        }
    }
}

/// Summary of a sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub outcomes: Vec<AttemptOutcome>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn synced(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Synced { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Failed { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                AttemptOutcome::Failed {
                    kind: FailureKind::Rejected,
                    ..
                }
            )
        })
    }

    /// Records actually submitted or interrupted, excluding skips.
    pub fn attempted(&self) -> usize {
        self.outcomes.len() - self.skipped()
    }

    pub fn interrupted(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                AttemptOutcome::Failed {
                    kind: FailureKind::Interrupted,
                    ..
                }
            )
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&AttemptOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Marks a record as having an attempt in flight for as long as it lives.
struct InFlightSlot<'a> {
    set: &'a Mutex<HashSet<String>>,
    record_id: String,
}

impl<'a> InFlightSlot<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, record_id: &str) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|p| p.into_inner());
        if !guard.insert(record_id.to_string()) {
            return None;
        }
        Some(Self {
            set,
            record_id: record_id.to_string(),
        })
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(&self.record_id);
    }
}

/// Reasons a state change was not made.
enum Refusal {
    Skip(String),
    Store(StoreError),
}

impl From<StoreError> for Refusal {
    fn from(e: StoreError) -> Self {
        Refusal::Store(e)
    }
}

pub struct SyncEngine {
    store: RecordStore,
    remote: Arc<dyn RemoteEndpoint>,
    settings: SyncSettings,
    pass_lock: tokio::sync::Mutex<()>,
    in_flight: Mutex<HashSet<String>>,
    shutdown: CancellationToken,
}

impl SyncEngine {
    pub fn new(store: RecordStore, remote: Arc<dyn RemoteEndpoint>, settings: SyncSettings) -> Self {
        Self {
            store,
            remote,
            settings,
            pass_lock: tokio::sync::Mutex::new(()),
            in_flight: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Cancels in-flight attempts and stops the scheduler. Interrupted
    /// records end up `SyncFailed` and are retried on the next start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs one pass: requeues failed records whose backoff elapsed, then
    /// attempts every pending record, oldest first, at most
    /// `concurrency` at a time.
    ///
    /// A pass requested while another is running returns an empty report.
    pub async fn run_pass(&self) -> Result<SyncReport, EngineError> {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            debug!("Sync pass already running, skipping");
            return Ok(SyncReport::default());
        };
        if self.shutdown.is_cancelled() {
            return Ok(SyncReport::default());
        }

        self.pass_inner().instrument(info_span!("sync_pass")).await
    }

    async fn pass_inner(&self) -> Result<SyncReport, EngineError> {
        let candidates = self.collect_candidates(Utc::now())?;
        if candidates.is_empty() {
            return Ok(SyncReport::default());
        }
        info!(candidates = candidates.len(), "Starting sync pass");

        let outcomes: Vec<AttemptOutcome> = stream::iter(candidates)
            .map(|record| self.attempt(record))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let report = SyncReport { outcomes };
        info!(
            synced = report.synced(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Sync pass finished"
        );
        Ok(report)
    }

    fn collect_candidates(&self, now: DateTime<Utc>) -> Result<Vec<ClassificationRecord>, EngineError> {
        for failed in self.store.query_by_status(RecordStatus::SyncFailed)? {
            if !backoff::is_due(
                &failed,
                self.settings.base_backoff,
                self.settings.max_backoff,
                now,
            ) {
                continue;
            }
            match self.requeue(failed.id()) {
                Ok(_) => debug!(record_id = failed.id(), "Requeued failed record"),
                Err(Refusal::Skip(reason)) => debug!(record_id = failed.id(), reason, "Not requeued"),
                Err(Refusal::Store(e)) => {
                    warn!(record_id = failed.id(), error = %e, "Failed to requeue record")
                }
            }
        }
        Ok(self.store.query_by_status(RecordStatus::PendingSync)?)
    }

    fn requeue(&self, id: &str) -> Result<ClassificationRecord, Refusal> {
        self.store.update(id, |record| {
            if record.status != RecordStatus::SyncFailed {
                return Err(Refusal::Skip(format!("status is {}", record.status.as_str())));
            }
            if record.failure_kind == Some(FailureKind::Rejected) {
                return Err(Refusal::Skip("rejected records need a manual retry".into()));
            }
            record.status = RecordStatus::PendingSync;
            record.failure_kind = None;
            record.last_error = None;
            Ok(())
        })
    }

    fn claim(&self, id: &str) -> Result<ClassificationRecord, Refusal> {
        self.store.update(id, |record| {
            if record.status != RecordStatus::PendingSync {
                return Err(Refusal::Skip(format!("status is {}", record.status.as_str())));
            }
            record.status = RecordStatus::Syncing;
            record.last_attempt_at = Some(timestamp_now());
            Ok(())
        })
    }

    async fn attempt(&self, record: ClassificationRecord) -> AttemptOutcome {
        let record_id = record.id().to_string();
        let Some(_slot) = InFlightSlot::acquire(&self.in_flight, &record_id) else {
            return AttemptOutcome::Skipped { record_id };
        };

        let span = info_span!(
            "sync_attempt",
            record_id = %record_id,
            attempt = record.sync_attempts() + 1,
        );
        self.attempt_owned(record_id).instrument(span).await
    }

    async fn attempt_owned(&self, record_id: String) -> AttemptOutcome {
        // Queued candidates stay pending once shutdown starts.
        if self.shutdown.is_cancelled() {
            debug!("Shutting down; record left pending");
            return AttemptOutcome::Skipped { record_id };
        }
        let claimed = match self.claim(&record_id) {
            Ok(record) => record,
            Err(Refusal::Skip(reason)) => {
                debug!(reason, "Record not claimed");
                return AttemptOutcome::Skipped { record_id };
            }
            Err(Refusal::Store(e)) => {
                error!(error = %e, "Failed to claim record");
                return AttemptOutcome::StoreFailed {
                    record_id,
                    error: e.to_string(),
                };
            }
        };

        let result = match SyncPayload::from_record(&claimed) {
            Some(payload) => {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => None,
                    result = tokio::time::timeout(
                        self.settings.attempt_timeout,
                        self.remote.submit(&record_id, &payload),
                    ) => Some(result.unwrap_or_else(|_| {
                        Err(SyncError::Retryable(format!(
                            "no answer within {:?}",
                            self.settings.attempt_timeout
                        )))
                    })),
                }
            }
            None => Some(Err(SyncError::Rejected(
                "record has no analysis".to_string(),
            ))),
        };

        self.settle(record_id, result)
    }

    /// Persists the attempt's outcome. `None` means the attempt was cancelled.
    fn settle(
        &self,
        record_id: String,
        result: Option<Result<SubmitAck, SyncError>>,
    ) -> AttemptOutcome {
        let (kind, error) = match result {
            Some(Ok(ack)) => return self.settle_synced(record_id, ack),
            Some(Err(e)) if e.is_retryable() => (FailureKind::Retryable, e.to_string()),
            Some(Err(e)) => (FailureKind::Rejected, e.to_string()),
            None => (
                FailureKind::Interrupted,
                "attempt interrupted by shutdown".to_string(),
            ),
        };

        let threshold = self.settings.attention_threshold;
        let stored = self.store.update(&record_id, |record| {
            if record.status != RecordStatus::Syncing {
                return Err(Refusal::Skip(format!("status is {}", record.status.as_str())));
            }
            record.status = RecordStatus::SyncFailed;
            record.failure_kind = Some(kind);
            record.last_error = Some(error.clone());
            // Backoff counts from when the attempt ended.
            record.last_attempt_at = Some(timestamp_now());
            if kind != FailureKind::Interrupted {
                record.sync_attempts = record.sync_attempts.saturating_add(1);
            }
            Ok(())
        });

        match stored {
            Ok(record) => {
                if record.needs_attention(threshold) {
                    warn!(
                        attempts = record.sync_attempts(),
                        kind = kind.as_str(),
                        error = %error,
                        "Sync keeps failing; record needs attention"
                    );
                } else {
                    warn!(
                        attempts = record.sync_attempts(),
                        kind = kind.as_str(),
                        error = %error,
                        "Sync attempt failed"
                    );
                }
                AttemptOutcome::Failed {
                    record_id,
                    kind,
                    error,
                }
            }
            Err(refusal) => self.settle_refused(record_id, refusal),
        }
    }

    fn settle_synced(&self, record_id: String, ack: SubmitAck) -> AttemptOutcome {
        let remote_id = ack.remote_id().to_string();
        let already_existed = matches!(ack, SubmitAck::AlreadyExists { .. });

        let stored = self.store.update(&record_id, |record| {
            if record.status != RecordStatus::Syncing {
                return Err(Refusal::Skip(format!("status is {}", record.status.as_str())));
            }
            record.status = RecordStatus::Synced;
            record.remote_id = Some(remote_id.clone());
            record.failure_kind = None;
            record.last_error = None;
            Ok(())
        });

        match stored {
            Ok(_) => {
                info!(remote_id = %remote_id, already_existed, "Record synced");
                AttemptOutcome::Synced {
                    record_id,
                    remote_id,
                    already_existed,
                }
            }
            Err(refusal) => self.settle_refused(record_id, refusal),
        }
    }

    fn settle_refused(&self, record_id: String, refusal: Refusal) -> AttemptOutcome {
        match refusal {
            Refusal::Skip(reason) => {
                warn!(reason, "Record changed during attempt; outcome dropped");
                AttemptOutcome::Skipped { record_id }
            }
            Refusal::Store(e) => {
                error!(error = %e, "Failed to store sync outcome");
                AttemptOutcome::StoreFailed {
                    record_id,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Operator-initiated retry of a failed record, rejected ones included.
    /// The attempt count is kept.
    pub fn retry_now(&self, id: &str) -> Result<ClassificationRecord, EngineError> {
        let record = self.store.update(id, |record| {
            if record.status != RecordStatus::SyncFailed {
                return Err(EngineError::NotRetryable {
                    id: record.id.clone(),
                    status: record.status,
                });
            }
            record.status = RecordStatus::PendingSync;
            record.failure_kind = None;
            record.last_error = None;
            Ok(())
        })?;
        info!(record_id = id, "Manual sync retry requested");
        Ok(record)
    }

    /// Moves records left in `Syncing` by a previous run to `SyncFailed`
    /// so they are retried. Returns how many were recovered.
    pub fn recover_interrupted(&self) -> Result<usize, EngineError> {
        let mut recovered = 0;
        for record in self.store.query_by_status(RecordStatus::Syncing)? {
            let Some(_slot) = InFlightSlot::acquire(&self.in_flight, record.id()) else {
                continue;
            };
            let result = self.store.update(record.id(), |r| {
                if r.status != RecordStatus::Syncing {
                    return Err(Refusal::Skip(String::new()));
                }
                r.status = RecordStatus::SyncFailed;
                r.failure_kind = Some(FailureKind::Interrupted);
                r.last_error = Some("attempt interrupted before completion".to_string());
                Ok(())
            });
            match result {
                Ok(_) => recovered += 1,
                Err(Refusal::Skip(_)) => {}
                Err(Refusal::Store(e)) => return Err(e.into()),
            }
        }
        if recovered > 0 {
            info!(recovered, "Recovered interrupted sync attempts");
        }
        Ok(recovered)
    }

    /// Failed records that were rejected or reached the attention threshold.
    pub fn needs_attention(&self) -> Result<Vec<ClassificationRecord>, EngineError> {
        let threshold = self.settings.attention_threshold;
        Ok(self
            .store
            .query_by_status(RecordStatus::SyncFailed)?
            .into_iter()
            .filter(|r| query::needs_attention(r, threshold))
            .collect())
    }

    /// When a failed record becomes eligible again, if ever.
    pub fn next_attempt_at(&self, record: &ClassificationRecord) -> Option<DateTime<Utc>> {
        backoff::next_attempt_at(record, self.settings.base_backoff, self.settings.max_backoff)
    }
}
