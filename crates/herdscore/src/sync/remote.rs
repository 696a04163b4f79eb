//! Remote system of record.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SyncError;
use crate::model::{ClassificationRecord, Traits};

/// What is sent for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub record_id: String,
    pub image_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animal_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub traits: Traits,
    pub category: String,
    pub confidence: f64,
    pub score: f64,
    pub captured_at: DateTime<Utc>,
}

impl SyncPayload {
    /// `None` for a record without analysis, which is never committed.
    pub fn from_record(record: &ClassificationRecord) -> Option<Self> {
        let assessment = record.assessment()?;
        Some(Self {
            record_id: record.id().to_string(),
            image_ref: record.image_ref().to_string(),
            animal_tag: record.animal_tag.clone(),
            notes: record.notes.clone(),
            traits: assessment.traits().clone(),
            category: assessment.category().to_string(),
            confidence: assessment.confidence(),
            score: assessment.score(),
            captured_at: record.created_at(),
        })
    }
}

/// Successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAck {
    Created { remote_id: String },
    /// The key was seen before; equivalent to success.
    AlreadyExists { remote_id: String },
}

impl SubmitAck {
    pub fn remote_id(&self) -> &str {
        match self {
            SubmitAck::Created { remote_id } | SubmitAck::AlreadyExists { remote_id } => remote_id,
        }
    }
}

/// Remote endpoint contract.
///
/// `idempotency_key` identifies the logical record; a second submission
/// with the same key must not create a second remote entity.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    async fn submit(
        &self,
        idempotency_key: &str,
        payload: &SyncPayload,
    ) -> Result<SubmitAck, SyncError>;
}

#[derive(Default)]
struct RemoteState {
    entities: HashMap<String, (String, SyncPayload)>,
    next_id: u64,
    failures: VecDeque<SyncError>,
    failures_by_key: HashMap<String, VecDeque<SyncError>>,
    submitted: Vec<String>,
}

/// In-process endpoint keyed by idempotency key, with scriptable failures.
///
/// Resubmitting a known key replaces the stored payload and answers
/// `AlreadyExists` with the original remote id.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    latency: Duration,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The next submission, whatever its key, fails with `error`.
    pub fn fail_next(&self, error: SyncError) {
        self.lock().failures.push_back(error);
    }

    /// The next submission for `key` fails with `error`.
    pub fn fail_key(&self, key: &str, error: SyncError) {
        self.lock()
            .failures_by_key
            .entry(key.to_string())
            .or_default()
            .push_back(error);
    }

    /// Registers an entity as if an earlier submission had succeeded.
    pub fn preload(&self, key: &str, payload: SyncPayload) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        let remote_id = format!("BPA-{:08}", state.next_id);
        state
            .entities
            .insert(key.to_string(), (remote_id.clone(), payload));
        remote_id
    }

    pub fn remote_id_for(&self, key: &str) -> Option<String> {
        self.lock().entities.get(key).map(|(id, _)| id.clone())
    }

    pub fn payload_for(&self, key: &str) -> Option<SyncPayload> {
        self.lock().entities.get(key).map(|(_, p)| p.clone())
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    /// Submissions received, including failed ones.
    pub fn submissions(&self) -> usize {
        self.lock().submitted.len()
    }

    /// Idempotency keys in the order submissions arrived.
    pub fn submitted_keys(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }
}

#[async_trait]
impl RemoteEndpoint for InMemoryRemote {
    async fn submit(
        &self,
        idempotency_key: &str,
        payload: &SyncPayload,
    ) -> Result<SubmitAck, SyncError> {
        self.lock().submitted.push(idempotency_key.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();

        let keyed = state
            .failures_by_key
            .get_mut(idempotency_key)
            .and_then(VecDeque::pop_front);
        if let Some(error) = keyed.or_else(|| state.failures.pop_front()) {
            return Err(error);
        }

        if let Some((remote_id, stored)) = state.entities.get_mut(idempotency_key) {
            *stored = payload.clone();
            return Ok(SubmitAck::AlreadyExists {
                remote_id: remote_id.clone(),
            });
        }

        state.next_id += 1;
        let remote_id = format!("BPA-{:08}", state.next_id);
        state.entities.insert(
            idempotency_key.to_string(),
            (remote_id.clone(), payload.clone()),
        );
        Ok(SubmitAck::Created { remote_id })
    }
}
