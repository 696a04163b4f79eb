//! Durable record store.
//!
//! Every change goes through [`RecordStore::update`], which re-reads the
//! record inside an immediate transaction, applies the caller's mutation to
//! a copy, validates the result and writes it with an optimistic
//! `updated_at` check. Either the whole change lands or none of it does.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::db::record_repo::{self, RecordRow};
use crate::db::{meta_repo, Database, DatabaseError};
use crate::error::StoreError;
use crate::model::id::{format_record_id, generate_device_id};
use crate::model::{Assessment, ClassificationRecord, FailureKind, ImageRef, RecordStatus, Traits};
use crate::store::events::{RecordEvent, RecordEventBroadcaster};

const EVENT_CAPACITY: usize = 256;

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Current time at the precision the store persists.
pub(crate) fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", value, e))
}

fn corrupt(id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Database(DatabaseError::CorruptRow {
        table: "records",
        id: id.to_string(),
        reason: reason.into(),
    })
}

fn decode(row: RecordRow) -> Result<ClassificationRecord, StoreError> {
    let id = row.id;
    let status =
        RecordStatus::parse(&row.status).ok_or_else(|| corrupt(&id, format!("unknown status '{}'", row.status)))?;

    let assessment = match (row.traits, row.category, row.confidence, row.score) {
        (None, None, None, None) => None,
        (Some(traits), Some(category), Some(confidence), Some(score)) => {
            let traits: Traits = serde_json::from_str(&traits)
                .map_err(|e| corrupt(&id, format!("invalid traits JSON: {}", e)))?;
            Some(Assessment {
                traits,
                category,
                confidence,
                score,
            })
        }
        _ => return Err(corrupt(&id, "analysis columns are only partially set")),
    };

    let failure_kind = match row.failure_kind {
        Some(kind) => Some(
            FailureKind::parse(&kind)
                .ok_or_else(|| corrupt(&id, format!("unknown failure kind '{}'", kind)))?,
        ),
        None => None,
    };

    let created_at = parse_timestamp(&row.created_at).map_err(|e| corrupt(&id, e))?;
    let updated_at = parse_timestamp(&row.updated_at).map_err(|e| corrupt(&id, e))?;
    let last_attempt_at = row
        .last_attempt_at
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .map_err(|e| corrupt(&id, e))?;

    let record = ClassificationRecord {
        id,
        image_ref: ImageRef::new(row.image_ref),
        animal_tag: row.animal_tag,
        notes: row.notes,
        assessment,
        status,
        created_at,
        updated_at,
        sync_attempts: row.sync_attempts,
        last_attempt_at,
        last_error: row.last_error,
        failure_kind,
        remote_id: row.remote_id,
    };

    record
        .check_invariants()
        .map_err(|reason| corrupt(&record.id, reason))?;
    Ok(record)
}

fn encode(record: &ClassificationRecord) -> Result<RecordRow, StoreError> {
    let traits = match &record.assessment {
        Some(a) => Some(serde_json::to_string(&a.traits).map_err(|e| {
            StoreError::InvariantViolation {
                id: record.id.clone(),
                reason: format!("traits are not serializable: {}", e),
            }
        })?),
        None => None,
    };

    Ok(RecordRow {
        id: record.id.clone(),
        image_ref: record.image_ref.as_str().to_string(),
        traits,
        category: record.assessment.as_ref().map(|a| a.category.clone()),
        confidence: record.assessment.as_ref().map(|a| a.confidence),
        score: record.assessment.as_ref().map(|a| a.score),
        status: record.status.as_str().to_string(),
        created_at: format_timestamp(record.created_at),
        updated_at: format_timestamp(record.updated_at),
        sync_attempts: record.sync_attempts,
        last_attempt_at: record.last_attempt_at.map(format_timestamp),
        last_error: record.last_error.clone(),
        failure_kind: record.failure_kind.map(|k| k.as_str().to_string()),
        remote_id: record.remote_id.clone(),
        animal_tag: record.animal_tag.clone(),
        notes: record.notes.clone(),
    })
}

/// True when the fields that describe the animal differ.
fn payload_changed(a: &ClassificationRecord, b: &ClassificationRecord) -> bool {
    a.image_ref != b.image_ref
        || a.assessment != b.assessment
        || a.animal_tag != b.animal_tag
        || a.notes != b.notes
}

fn validate_change(
    current: &ClassificationRecord,
    next: &ClassificationRecord,
) -> Result<(), StoreError> {
    let immutable = |field: &'static str| StoreError::ImmutableField {
        id: current.id.clone(),
        field,
    };
    if next.id != current.id {
        return Err(immutable("id"));
    }
    if next.created_at != current.created_at {
        return Err(immutable("created_at"));
    }
    if next.updated_at != current.updated_at {
        return Err(immutable("updated_at"));
    }
    if let (Some(before), Some(after)) = (current.confidence(), next.confidence()) {
        if before.to_bits() != after.to_bits() {
            return Err(immutable("confidence"));
        }
    }

    if next.status != current.status && !current.status.can_transition_to(next.status) {
        return Err(StoreError::IllegalTransition {
            id: current.id.clone(),
            from: current.status,
            to: next.status,
        });
    }

    // Committed records are frozen until reopened; only the sync
    // bookkeeping moves.
    if current.status.is_committed()
        && (next.status == current.status || payload_changed(current, next))
    {
        return Err(StoreError::ImmutableRecord {
            id: current.id.clone(),
            status: current.status,
        });
    }

    next.check_invariants()
        .map_err(|reason| StoreError::InvariantViolation {
            id: current.id.clone(),
            reason,
        })
}

enum Step<E> {
    Unchanged(ClassificationRecord),
    Written(RecordStatus, ClassificationRecord),
    Rejected(E),
}

// ─── RecordStore ────────────────────────────────────────────────────────────

/// Persistent collection of classification records.
#[derive(Clone)]
pub struct RecordStore {
    db: Database,
    events: RecordEventBroadcaster,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            events: RecordEventBroadcaster::new(EVENT_CAPACITY),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Subscribes to committed record changes.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }

    /// Persists a new draft record.
    pub fn create(&self, record: &ClassificationRecord) -> Result<ClassificationRecord, StoreError> {
        if record.status != RecordStatus::Draft {
            return Err(StoreError::InvariantViolation {
                id: record.id.clone(),
                reason: format!("new records start as drafts, not {}", record.status.as_str()),
            });
        }
        let mut record = record.clone();
        record.created_at = record.created_at.trunc_subsecs(6);
        record.updated_at = record.updated_at.trunc_subsecs(6);
        record
            .check_invariants()
            .map_err(|reason| StoreError::InvariantViolation {
                id: record.id.clone(),
                reason,
            })?;

        let row = encode(&record)?;
        self.db.with_tx(|tx| -> Result<(), StoreError> {
            if record_repo::find_by_id(tx, &row.id)?.is_some() {
                return Err(StoreError::DuplicateId(row.id.clone()));
            }
            record_repo::insert(tx, &row)?;
            Ok(())
        })?;

        log::debug!("Created record {}", record.id);
        self.events.send(RecordEvent {
            record_id: record.id.clone(),
            previous: None,
            status: record.status,
            updated_at: record.updated_at,
        });
        Ok(record)
    }

    /// Returns the record with the given id.
    pub fn get(&self, id: &str) -> Result<ClassificationRecord, StoreError> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn find(&self, id: &str) -> Result<Option<ClassificationRecord>, StoreError> {
        let row = self.db.with_conn(|conn| record_repo::find_by_id(conn, id))?;
        row.map(decode).transpose()
    }

    /// Applies `mutator` to the current state of record `id` as one atomic,
    /// validated change and returns the stored result.
    ///
    /// The mutator sees a copy; returning `Err` abandons the change. A
    /// mutation that changes nothing writes nothing. `updated_at` is set by
    /// the store and strictly increases with every write.
    pub fn update<F, E>(&self, id: &str, mutator: F) -> Result<ClassificationRecord, E>
    where
        F: FnOnce(&mut ClassificationRecord) -> Result<(), E>,
        E: From<StoreError>,
    {
        let step = self.db.with_tx(|tx| -> Result<Step<E>, StoreError> {
            let row = record_repo::find_by_id(tx, id)?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let current = decode(row)?;

            let mut next = current.clone();
            if let Err(e) = mutator(&mut next) {
                return Ok(Step::Rejected(e));
            }
            if next == current {
                return Ok(Step::Unchanged(current));
            }

            validate_change(&current, &next)?;
            next.updated_at = std::cmp::max(
                timestamp_now(),
                current.updated_at + chrono::Duration::microseconds(1),
            );

            let changed = record_repo::update_if_current(
                tx,
                &encode(&next)?,
                &format_timestamp(current.updated_at),
            )?;
            if changed == 0 {
                return Err(StoreError::WriteConflict(id.to_string()));
            }
            Ok(Step::Written(current.status, next))
        });
        let step = step.map_err(|e| {
            if matches!(e, StoreError::NotFound(_) | StoreError::WriteConflict(_)) {
                log::error!("Update of record {} failed: {}", id, e);
            }
            e
        })?;

        match step {
            Step::Rejected(e) => Err(e),
            Step::Unchanged(record) => Ok(record),
            Step::Written(previous, record) => {
                log::debug!(
                    "Record {} updated ({} -> {})",
                    record.id,
                    previous.as_str(),
                    record.status.as_str()
                );
                self.events.send(RecordEvent {
                    record_id: record.id.clone(),
                    previous: Some(previous),
                    status: record.status,
                    updated_at: record.updated_at,
                });
                Ok(record)
            }
        }
    }

    /// Records in the given status, oldest first.
    pub fn query_by_status(
        &self,
        status: RecordStatus,
    ) -> Result<Vec<ClassificationRecord>, StoreError> {
        let rows = self
            .db
            .with_conn(|conn| record_repo::list_by_status(conn, status.as_str()))?;
        rows.into_iter().map(decode).collect()
    }

    /// Every record, oldest first.
    pub fn list_all(&self) -> Result<Vec<ClassificationRecord>, StoreError> {
        let rows = self.db.with_conn(record_repo::list_all)?;
        rows.into_iter().map(decode).collect()
    }

    pub fn count_by_status(&self) -> Result<HashMap<RecordStatus, u64>, StoreError> {
        let counts = self.db.with_conn(record_repo::count_by_status)?;
        counts
            .into_iter()
            .map(|(status, count)| {
                RecordStatus::parse(&status)
                    .map(|s| (s, count))
                    .ok_or_else(|| corrupt("*", format!("unknown status '{}'", status)))
            })
            .collect()
    }

    /// Reserves a new record id for this device. Never returns the same id
    /// twice, even across restarts.
    pub fn allocate_id(&self, device_id: &str) -> Result<String, StoreError> {
        let sequence = self
            .db
            .with_tx(|tx| meta_repo::next_sequence(tx, device_id))?;
        Ok(format_record_id(device_id, sequence, timestamp_now()))
    }

    /// Resolves the device id: the configured one if given (persisting it),
    /// otherwise the persisted one, otherwise a newly generated one.
    pub fn device_id(&self, configured: Option<&str>) -> Result<String, StoreError> {
        let id = self.db.with_tx(|tx| -> Result<String, DatabaseError> {
            let stored = meta_repo::device_id(tx)?;
            match (configured, stored) {
                (Some(configured), Some(stored)) if configured == stored => Ok(stored),
                (Some(configured), stored) => {
                    if let Some(previous) = stored {
                        log::warn!(
                            "Device id changed from {} to {} by configuration",
                            previous,
                            configured
                        );
                    }
                    meta_repo::set_device_id(tx, configured)?;
                    Ok(configured.to_string())
                }
                (None, Some(stored)) => Ok(stored),
                (None, None) => {
                    let generated = generate_device_id();
                    log::info!("Generated device id {}", generated);
                    meta_repo::set_device_id(tx, &generated)?;
                    Ok(generated)
                }
            }
        })?;
        Ok(id)
    }
}
