//! Scripted analysis provider for demos and tests.
//!
//! Returns queued outcomes in order, then falls back to a fixed outcome.
//! An optional latency makes timeouts and cancellation observable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AnalysisProvider, AnalysisResult};
use crate::error::AnalysisError;
use crate::model::{ImageRef, TraitMeasurement, Traits};

/// Measurements of a mature Sahiwal cow, as produced by the field kit demo.
pub fn sample_result() -> AnalysisResult {
    let mut traits = Traits::new();
    traits.insert("bodyLength".into(), TraitMeasurement::centimeters(152.3));
    traits.insert("chestWidth".into(), TraitMeasurement::centimeters(68.7));
    traits.insert("heightAtWithers".into(), TraitMeasurement::centimeters(142.1));
    traits.insert("rumpAngle".into(), TraitMeasurement::degrees(28.5));
    traits.insert("legLength".into(), TraitMeasurement::centimeters(71.2));
    AnalysisResult {
        traits,
        suggested_category: "Sahiwal".to_string(),
        confidence: 94.2,
    }
}

type Outcome = Result<AnalysisResult, AnalysisError>;

pub struct StubAnalysisProvider {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    latency: Duration,
    calls: AtomicUsize,
}

impl StubAnalysisProvider {
    /// Always answers with `result`.
    pub fn new(result: AnalysisResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(result),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with `error`.
    pub fn failing(error: AnalysisError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::new(sample_result())
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues an outcome to be returned before the fallback.
    pub fn push_outcome(&self, outcome: Outcome) {
        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        script.push_back(outcome);
    }

    /// Number of `analyze` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubAnalysisProvider {
    fn default() -> Self {
        Self::new(sample_result())
    }
}

#[async_trait]
impl AnalysisProvider for StubAnalysisProvider {
    async fn analyze(&self, image: &ImageRef) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = {
            let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
            script.pop_front()
        };
        let outcome = scripted.unwrap_or_else(|| self.fallback.clone());
        log::debug!(
            "Stub analysis of {} -> {}",
            image,
            if outcome.is_ok() { "ok" } else { "error" }
        );
        outcome
    }

    fn name(&self) -> &str {
        "stub"
    }
}
