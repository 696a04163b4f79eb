//! Workflow error types.

use thiserror::Error;

use crate::error::{AnalysisError, CaptureError, StoreError};
use crate::model::RecordStatus;

/// Errors surfaced to the operator by classification workflow actions.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Record '{id}' is {status}; cannot {action}")]
    InvalidState {
        id: String,
        status: RecordStatus,
        action: &'static str,
    },

    #[error("Record '{0}' has not been analyzed yet")]
    NotAnalyzed(String),

    #[error("Record '{0}' is already analyzed; recapture to analyze again")]
    AlreadyAnalyzed(String),

    #[error("Record '{id}' has no trait named '{name}'")]
    UnknownTrait { id: String, name: String },

    #[error("Invalid value {value} for trait '{name}'")]
    InvalidTraitValue { name: String, value: f64 },

    #[error("Category must not be blank")]
    BlankCategory,

    #[error("Analysis of record '{0}' was cancelled")]
    AnalysisCancelled(String),

    #[error("Analysis result for record '{0}' was discarded because the record changed")]
    AnalysisDiscarded(String),

    #[error("Analysis task aborted: {0}")]
    AnalysisAborted(String),

    #[error("No async runtime available to run analysis")]
    NoRuntime,
}

impl WorkflowError {
    /// The operator has to take a new photo to make progress.
    pub fn requires_recapture(&self) -> bool {
        matches!(
            self,
            WorkflowError::Analysis(AnalysisError::ImageUnusable(_)) | WorkflowError::Capture(_)
        )
    }

    /// Trying the same action again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Analysis(e) => e.is_retryable(),
            WorkflowError::Store(StoreError::WriteConflict(_)) => true,
            WorkflowError::AnalysisCancelled(_) => true,
            _ => false,
        }
    }
}
