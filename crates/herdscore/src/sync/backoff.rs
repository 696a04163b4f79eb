//! Retry scheduling for failed sync attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{ClassificationRecord, FailureKind, RecordStatus};

/// `min(max, base * 2^attempts)`.
pub fn backoff_delay(attempts: u32, base: Duration, max: Duration) -> Duration {
    2u32.checked_pow(attempts)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

/// When a failed record may be retried automatically.
///
/// `None` means never: rejected records wait for the operator. Interrupted
/// attempts were never answered, so they are due immediately.
pub fn next_attempt_at(
    record: &ClassificationRecord,
    base: Duration,
    max: Duration,
) -> Option<DateTime<Utc>> {
    if record.status() != RecordStatus::SyncFailed {
        return None;
    }
    match record.failure_kind()? {
        FailureKind::Rejected => None,
        FailureKind::Interrupted => Some(record.updated_at()),
        FailureKind::Retryable => {
            let delay = backoff_delay(record.sync_attempts(), base, max);
            let since = record.last_attempt_at().unwrap_or_else(|| record.updated_at());
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
            Some(since.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
        }
    }
}

pub fn is_due(record: &ClassificationRecord, base: Duration, max: Duration, now: DateTime<Utc>) -> bool {
    next_attempt_at(record, base, max).is_some_and(|at| at <= now)
}
