//! Background analysis tasks.
//!
//! Each started analysis runs on its own tokio task with a cancellation
//! token. Its result is applied only if the record is still the draft it
//! was started for: same image, no analysis yet. Anything else is
//! discarded, so a superseded or cancelled analysis can never overwrite
//! newer state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::analysis::{AnalysisProvider, AnalysisResult, AnalysisSettings};
use crate::error::{AnalysisError, StoreError};
use crate::model::{Assessment, ClassificationRecord, ImageRef, RecordStatus};
use crate::scoring::BreedStandards;
use crate::store::RecordStore;

/// How a background analysis ended.
#[derive(Debug)]
pub enum AnalysisOutcome {
    /// The result was written to the record.
    Applied(ClassificationRecord),
    /// The provider failed (after retries) or returned an invalid result.
    Failed(AnalysisError),
    Cancelled,
    /// The record moved on while the analysis ran; nothing was written.
    Discarded,
    /// The result could not be persisted.
    Store(StoreError),
    /// The task panicked or was aborted by the runtime.
    Aborted(String),
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

/// Analyses currently running, keyed by record id.
#[derive(Clone, Default)]
pub(crate) struct InFlightAnalyses {
    inner: Arc<Mutex<InFlightState>>,
}

#[derive(Default)]
struct InFlightState {
    next_generation: u64,
    tasks: HashMap<String, InFlight>,
}

impl InFlightAnalyses {
    /// Registers a new analysis for `record_id`, cancelling any previous one.
    fn register(&self, record_id: &str, token: CancellationToken) -> u64 {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        state.next_generation += 1;
        let generation = state.next_generation;
        if let Some(previous) = state
            .tasks
            .insert(record_id.to_string(), InFlight { generation, token })
        {
            previous.token.cancel();
        }
        generation
    }

    /// Removes the entry if it still belongs to `generation`.
    fn release(&self, record_id: &str, generation: u64) {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if state
            .tasks
            .get(record_id)
            .is_some_and(|t| t.generation == generation)
        {
            state.tasks.remove(record_id);
        }
    }

    /// Cancels the running analysis of `record_id`. Returns true if one was running.
    pub(crate) fn cancel(&self, record_id: &str) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match state.tasks.remove(record_id) {
            Some(task) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&self) {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        for (_, task) in state.tasks.drain() {
            task.token.cancel();
        }
    }

    pub(crate) fn is_running(&self, record_id: &str) -> bool {
        let state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        state.tasks.contains_key(record_id)
    }
}

/// Handle to a running analysis.
pub struct AnalysisTask {
    record_id: String,
    token: CancellationToken,
    handle: JoinHandle<AnalysisOutcome>,
}

impl AnalysisTask {
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Requests cancellation. The record is left untouched.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task to end.
    pub async fn wait(self) -> AnalysisOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => AnalysisOutcome::Cancelled,
            Err(e) => AnalysisOutcome::Aborted(e.to_string()),
        }
    }
}

/// Everything one analysis run needs, owned so it can move onto a task.
pub(crate) struct AnalysisJob {
    pub(crate) store: RecordStore,
    pub(crate) provider: Arc<dyn AnalysisProvider>,
    pub(crate) standards: Arc<BreedStandards>,
    pub(crate) settings: AnalysisSettings,
    pub(crate) registry: InFlightAnalyses,
    pub(crate) record_id: String,
    pub(crate) image_ref: ImageRef,
}

impl AnalysisJob {
    /// Spawns the job on the current tokio runtime.
    pub(crate) fn spawn(self, runtime: &tokio::runtime::Handle) -> AnalysisTask {
        let token = CancellationToken::new();
        let generation = self.registry.register(&self.record_id, token.clone());
        let record_id = self.record_id.clone();
        let job_token = token.clone();
        let handle = runtime.spawn(self.run(generation, job_token));
        AnalysisTask {
            record_id,
            token,
            handle,
        }
    }

    async fn run(self, generation: u64, token: CancellationToken) -> AnalysisOutcome {
        let span = info_span!(
            "analysis",
            record_id = %self.record_id,
            image = %self.image_ref,
            provider = self.provider.name(),
        );

        let outcome = async {
            tokio::select! {
                biased;
                _ = token.cancelled() => AnalysisOutcome::Cancelled,
                result = self.call_with_retries() => match result {
                    Ok(result) if !token.is_cancelled() => self.apply(result),
                    Ok(_) => AnalysisOutcome::Cancelled,
                    Err(e) => AnalysisOutcome::Failed(e),
                },
            }
        }
        .instrument(span.clone())
        .await;

        self.registry.release(&self.record_id, generation);

        span.in_scope(|| match &outcome {
            AnalysisOutcome::Applied(record) => tracing::info!(
                category = record.category().unwrap_or_default(),
                score = record.score().unwrap_or_default(),
                "Analysis applied"
            ),
            AnalysisOutcome::Failed(e) => tracing::warn!(error = %e, "Analysis failed"),
            AnalysisOutcome::Cancelled => tracing::info!("Analysis cancelled"),
            AnalysisOutcome::Discarded => {
                tracing::info!("Analysis result discarded; record changed meanwhile")
            }
            AnalysisOutcome::Store(e) => tracing::error!(error = %e, "Failed to store analysis"),
            AnalysisOutcome::Aborted(reason) => tracing::error!(reason = %reason, "Analysis aborted"),
        });
        outcome
    }

    async fn call_with_retries(&self) -> Result<AnalysisResult, AnalysisError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(
                self.settings.timeout,
                self.provider.analyze(&self.image_ref),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout(self.settings.timeout)),
            };

            match result {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.settings.delay_before_retry(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Analysis attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn apply(&self, result: AnalysisResult) -> AnalysisOutcome {
        if let Err(e) = result.validate() {
            return AnalysisOutcome::Failed(e);
        }
        let category = result.suggested_category.trim().to_string();
        let score = self.standards.score(&result.traits, &category);

        enum ApplyError {
            Stale,
            Store(StoreError),
        }
        impl From<StoreError> for ApplyError {
            fn from(e: StoreError) -> Self {
                ApplyError::Store(e)
            }
        }

        let applied = self.store.update(&self.record_id, |record| {
            if record.status != RecordStatus::Draft
                || record.assessment.is_some()
                || record.image_ref != self.image_ref
            {
                return Err(ApplyError::Stale);
            }
            record.assessment = Some(Assessment {
                traits: result.traits,
                category,
                confidence: result.confidence,
                score,
            });
            Ok(())
        });

        match applied {
            Ok(record) => AnalysisOutcome::Applied(record),
            Err(ApplyError::Stale) => AnalysisOutcome::Discarded,
            Err(ApplyError::Store(StoreError::NotFound(_))) => AnalysisOutcome::Discarded,
            Err(ApplyError::Store(e)) => AnalysisOutcome::Store(e),
        }
    }
}
