//! The classification record and its analysis payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{FailureKind, RecordStatus};
use super::traits::{first_non_finite, Traits};

/// Opaque reference to a stored capture image.
///
/// Every capture produces a fresh reference, so two analyses of the same
/// record can be told apart by the image they were started for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of a completed analysis, possibly corrected by the operator.
///
/// The four values are present together or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub(crate) traits: Traits,
    pub(crate) category: String,
    pub(crate) confidence: f64,
    pub(crate) score: f64,
}

impl Assessment {
    pub fn traits(&self) -> &Traits {
        &self.traits
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Analyzer confidence in percent. Not editable.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Classification score in `[0, 100]`.
    pub fn score(&self) -> f64 {
        self.score
    }
}

/// One animal-classification event.
///
/// Identity, timestamps, lifecycle and sync bookkeeping are only writable
/// inside the crate; every change goes through the record store, which
/// validates it. The operator-owned `animal_tag` and `notes` are public.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
    pub(crate) id: String,
    pub(crate) image_ref: ImageRef,
    /// Ear tag or herd-book number typed in by the operator.
    pub animal_tag: Option<String>,
    pub notes: Option<String>,
    pub(crate) assessment: Option<Assessment>,
    pub(crate) status: RecordStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) sync_attempts: u32,
    pub(crate) last_attempt_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    pub(crate) failure_kind: Option<FailureKind>,
    pub(crate) remote_id: Option<String>,
}

impl ClassificationRecord {
    /// Creates a fresh draft for a just-captured image.
    pub(crate) fn new_draft(id: String, image_ref: ImageRef, now: DateTime<Utc>) -> Self {
        Self {
            id,
            image_ref,
            animal_tag: None,
            notes: None,
            assessment: None,
            status: RecordStatus::Draft,
            created_at: now,
            updated_at: now,
            sync_attempts: 0,
            last_attempt_at: None,
            last_error: None,
            failure_kind: None,
            remote_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image_ref(&self) -> &ImageRef {
        &self.image_ref
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        self.assessment.as_ref()
    }

    pub fn traits(&self) -> Option<&Traits> {
        self.assessment.as_ref().map(|a| &a.traits)
    }

    pub fn category(&self) -> Option<&str> {
        self.assessment.as_ref().map(|a| a.category.as_str())
    }

    pub fn confidence(&self) -> Option<f64> {
        self.assessment.as_ref().map(|a| a.confidence)
    }

    pub fn score(&self) -> Option<f64> {
        self.assessment.as_ref().map(|a| a.score)
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn sync_attempts(&self) -> u32 {
        self.sync_attempts
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure_kind
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn is_analyzed(&self) -> bool {
        self.assessment.is_some()
    }

    /// True once the sync failure count reaches `threshold`.
    pub fn needs_attention(&self, threshold: u32) -> bool {
        threshold > 0 && self.sync_attempts >= threshold
    }

    /// Checks the structural invariants that hold in every persisted state.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("record id is empty".to_string());
        }
        if self.image_ref.as_str().is_empty() {
            return Err("image reference is empty".to_string());
        }

        if let Some(assessment) = &self.assessment {
            if let Some(name) = first_non_finite(&assessment.traits) {
                return Err(format!("trait '{name}' is not a finite number"));
            }
            if assessment.category.trim().is_empty() {
                return Err("category is blank".to_string());
            }
            if !(0.0..=100.0).contains(&assessment.confidence) {
                return Err(format!(
                    "confidence {} is outside [0, 100]",
                    assessment.confidence
                ));
            }
            if !(0.0..=100.0).contains(&assessment.score) {
                return Err(format!("score {} is outside [0, 100]", assessment.score));
            }
        } else if self.status.is_committed() {
            return Err(format!(
                "{} record has no analysis",
                self.status.as_str()
            ));
        }

        let synced = self.status == RecordStatus::Synced;
        if synced != self.remote_id.is_some() {
            return Err(if synced {
                "synced record has no remote id".to_string()
            } else {
                "only synced records carry a remote id".to_string()
            });
        }

        let failed = self.status == RecordStatus::SyncFailed;
        if failed != self.failure_kind.is_some() {
            return Err(if failed {
                "failed record has no failure kind".to_string()
            } else {
                "only failed records carry a failure kind".to_string()
            });
        }

        if self.updated_at < self.created_at {
            return Err("updated_at precedes created_at".to_string());
        }

        Ok(())
    }
}
