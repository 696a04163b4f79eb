//! Analysis providers turn a captured image into trait measurements and a
//! suggested breed.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::model::traits::first_non_finite;
use crate::model::{ImageRef, Traits};

pub mod stub;

pub use stub::{sample_result, StubAnalysisProvider};

/// Raw provider output, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub traits: Traits,
    pub suggested_category: String,
    /// Percent, `[0, 100]`.
    pub confidence: f64,
}

impl AnalysisResult {
    /// Rejects results that cannot be stored on a record.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.traits.is_empty() {
            return Err(AnalysisError::InvalidResult(
                "no traits measured".to_string(),
            ));
        }
        if let Some(name) = first_non_finite(&self.traits) {
            return Err(AnalysisError::InvalidResult(format!(
                "trait '{}' is not a finite number",
                name
            )));
        }
        if self.suggested_category.trim().is_empty() {
            return Err(AnalysisError::InvalidResult(
                "no category suggested".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(AnalysisError::InvalidResult(format!(
                "confidence {} outside [0, 100]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Something that can measure an animal from its photo.
///
/// Implementations may be slow and may fail; the workflow applies its own
/// timeout and retry policy around every call.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, image: &ImageRef) -> Result<AnalysisResult, AnalysisError>;

    fn name(&self) -> &str {
        "analysis"
    }
}

/// Timeout and retry policy for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub timeout: Duration,
    /// Total provider calls per analysis, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_delay: Duration,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl AnalysisSettings {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.retry_delay.saturating_mul(factor)
    }
}
