//! Classification workflow: capture, analysis, operator review, commit.
//!
//! The workflow owns a record until it is committed. After commit the sync
//! engine owns it until an explicit reopen.

use std::sync::Arc;

use crate::analysis::{AnalysisProvider, AnalysisSettings};
use crate::capture::ImageVault;
use crate::model::{ClassificationRecord, RecordStatus};
use crate::scoring::BreedStandards;
use crate::store::{timestamp_now, RecordStore};

pub mod error;
pub mod task;

pub use error::WorkflowError;
pub use task::{AnalysisOutcome, AnalysisTask};

use task::{AnalysisJob, InFlightAnalyses};

fn ensure_draft(record: &ClassificationRecord, action: &'static str) -> Result<(), WorkflowError> {
    if record.status != RecordStatus::Draft {
        return Err(WorkflowError::InvalidState {
            id: record.id.clone(),
            status: record.status,
            action,
        });
    }
    Ok(())
}

/// Trims free text; blank becomes `None`.
fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub struct ClassificationWorkflow {
    store: RecordStore,
    vault: ImageVault,
    provider: Arc<dyn AnalysisProvider>,
    standards: Arc<BreedStandards>,
    settings: AnalysisSettings,
    device_id: String,
    in_flight: InFlightAnalyses,
}

impl ClassificationWorkflow {
    pub fn new(
        store: RecordStore,
        vault: ImageVault,
        provider: Arc<dyn AnalysisProvider>,
        standards: Arc<BreedStandards>,
        settings: AnalysisSettings,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            vault,
            provider,
            standards,
            settings,
            device_id: device_id.into(),
            in_flight: InFlightAnalyses::default(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn standards(&self) -> &BreedStandards {
        &self.standards
    }

    pub fn get(&self, id: &str) -> Result<ClassificationRecord, WorkflowError> {
        Ok(self.store.get(id)?)
    }

    /// Stores a captured image and creates a draft record for it.
    ///
    /// An image that does not decode is rejected before an id is allocated.
    pub fn capture(&self, image: &[u8]) -> Result<ClassificationRecord, WorkflowError> {
        let format = ImageVault::inspect(image)?;
        let id = self.store.allocate_id(&self.device_id)?;
        let image_ref = self.vault.write(&id, image, format)?;

        let record = ClassificationRecord::new_draft(id, image_ref, timestamp_now());
        match self.store.create(&record) {
            Ok(created) => {
                log::info!("Captured record {}", created.id());
                Ok(created)
            }
            Err(e) => {
                if let Err(cleanup) = self.vault.remove(record.image_ref()) {
                    log::warn!("Failed to remove orphaned capture: {}", cleanup);
                }
                Err(e.into())
            }
        }
    }

    /// Starts analyzing a draft in the background and returns immediately.
    ///
    /// Starting again for the same record cancels the earlier run.
    pub fn start_analysis(&self, id: &str) -> Result<AnalysisTask, WorkflowError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| WorkflowError::NoRuntime)?;

        let record = self.store.get(id)?;
        ensure_draft(&record, "analyze")?;
        if record.is_analyzed() {
            return Err(WorkflowError::AlreadyAnalyzed(id.to_string()));
        }

        let job = AnalysisJob {
            store: self.store.clone(),
            provider: Arc::clone(&self.provider),
            standards: Arc::clone(&self.standards),
            settings: self.settings.clone(),
            registry: self.in_flight.clone(),
            record_id: record.id,
            image_ref: record.image_ref,
        };
        Ok(job.spawn(&runtime))
    }

    /// Runs an analysis to completion and returns the updated record.
    pub async fn analyze(&self, id: &str) -> Result<ClassificationRecord, WorkflowError> {
        match self.start_analysis(id)?.wait().await {
            AnalysisOutcome::Applied(record) => Ok(record),
            AnalysisOutcome::Failed(e) => Err(WorkflowError::Analysis(e)),
            AnalysisOutcome::Cancelled => Err(WorkflowError::AnalysisCancelled(id.to_string())),
            AnalysisOutcome::Discarded => Err(WorkflowError::AnalysisDiscarded(id.to_string())),
            AnalysisOutcome::Store(e) => Err(WorkflowError::Store(e)),
            AnalysisOutcome::Aborted(reason) => Err(WorkflowError::AnalysisAborted(reason)),
        }
    }

    /// Cancels the running analysis of `id`, if any. The record stays as it is.
    pub fn cancel_analysis(&self, id: &str) -> bool {
        self.in_flight.cancel(id)
    }

    pub fn is_analyzing(&self, id: &str) -> bool {
        self.in_flight.is_running(id)
    }

    /// Replaces the image of a draft and clears its analysis.
    pub fn recapture(&self, id: &str, image: &[u8]) -> Result<ClassificationRecord, WorkflowError> {
        let current = self.store.get(id)?;
        ensure_draft(&current, "recapture")?;
        let format = ImageVault::inspect(image)?;

        self.in_flight.cancel(id);
        let image_ref = self.vault.write(id, image, format)?;

        let result = self.store.update(id, |record| {
            ensure_draft(record, "recapture")?;
            record.image_ref = image_ref.clone();
            record.assessment = None;
            Ok(())
        });

        let (stale, keep) = match &result {
            Ok(_) => (current.image_ref(), &image_ref),
            Err(_) => (&image_ref, current.image_ref()),
        };
        if stale != keep {
            if let Err(e) = self.vault.remove(stale) {
                log::warn!("Failed to remove superseded capture {}: {}", stale, e);
            }
        }
        if result.is_ok() {
            log::info!("Recaptured record {}", id);
        }
        result
    }

    pub fn edit_trait(
        &self,
        id: &str,
        name: &str,
        value: f64,
    ) -> Result<ClassificationRecord, WorkflowError> {
        self.edit_traits(id, &[(name, value)])
    }

    /// Corrects measured values and recomputes the score in the same write.
    ///
    /// Only traits the analysis produced can be edited; units stay as measured.
    pub fn edit_traits(
        &self,
        id: &str,
        edits: &[(&str, f64)],
    ) -> Result<ClassificationRecord, WorkflowError> {
        for (name, value) in edits {
            if !value.is_finite() {
                return Err(WorkflowError::InvalidTraitValue {
                    name: name.to_string(),
                    value: *value,
                });
            }
        }

        self.store.update(id, |record| {
            ensure_draft(record, "edit traits")?;
            let record_id = record.id.clone();
            let assessment = record
                .assessment
                .as_mut()
                .ok_or_else(|| WorkflowError::NotAnalyzed(record_id.clone()))?;
            for (name, value) in edits {
                let measurement = assessment.traits.get_mut(*name).ok_or_else(|| {
                    WorkflowError::UnknownTrait {
                        id: record_id.clone(),
                        name: name.to_string(),
                    }
                })?;
                measurement.value = *value;
            }
            assessment.score = self
                .standards
                .score(&assessment.traits, &assessment.category);
            Ok(())
        })
    }

    /// Overrides the suggested breed and rescores against its standard.
    pub fn set_category(
        &self,
        id: &str,
        category: &str,
    ) -> Result<ClassificationRecord, WorkflowError> {
        let category = category.trim();
        if category.is_empty() {
            return Err(WorkflowError::BlankCategory);
        }

        self.store.update(id, |record| {
            ensure_draft(record, "change category")?;
            let record_id = record.id.clone();
            let assessment = record
                .assessment
                .as_mut()
                .ok_or(WorkflowError::NotAnalyzed(record_id))?;
            assessment.category = category.to_string();
            assessment.score = self.standards.score(&assessment.traits, category);
            Ok(())
        })
    }

    pub fn set_animal_tag(
        &self,
        id: &str,
        tag: Option<&str>,
    ) -> Result<ClassificationRecord, WorkflowError> {
        let tag = normalize_text(tag);
        self.store.update(id, |record| {
            ensure_draft(record, "change the animal tag")?;
            record.animal_tag = tag;
            Ok(())
        })
    }

    pub fn set_notes(
        &self,
        id: &str,
        notes: Option<&str>,
    ) -> Result<ClassificationRecord, WorkflowError> {
        let notes = normalize_text(notes);
        self.store.update(id, |record| {
            ensure_draft(record, "change notes")?;
            record.notes = notes;
            Ok(())
        })
    }

    /// Hands an analyzed draft to the sync engine.
    pub fn commit(&self, id: &str) -> Result<ClassificationRecord, WorkflowError> {
        let record = self.store.update(id, |record| {
            ensure_draft(record, "commit")?;
            if !record.is_analyzed() {
                return Err(WorkflowError::NotAnalyzed(record.id.clone()));
            }
            record.status = RecordStatus::PendingSync;
            Ok(())
        })?;
        log::info!("Committed record {} for sync", id);
        Ok(record)
    }

    /// Returns a synced record to draft so it can be corrected.
    ///
    /// The next sync reuses the record id as idempotency key, so the remote
    /// updates its existing entity instead of creating another.
    pub fn reopen(&self, id: &str) -> Result<ClassificationRecord, WorkflowError> {
        let record = self.store.update(id, |record| {
            if record.status != RecordStatus::Synced {
                return Err(WorkflowError::InvalidState {
                    id: record.id.clone(),
                    status: record.status,
                    action: "reopen",
                });
            }
            record.status = RecordStatus::Draft;
            record.remote_id = None;
            record.sync_attempts = 0;
            record.last_attempt_at = None;
            record.last_error = None;
            record.failure_kind = None;
            Ok(())
        })?;
        log::info!("Reopened record {}", id);
        Ok(record)
    }

    /// Cancels every running analysis.
    pub fn shutdown(&self) {
        self.in_flight.cancel_all();
    }
}
