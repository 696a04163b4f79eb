pub mod analysis;
pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod runtime;
pub mod scoring;
pub mod store;
pub mod sync;
pub mod workflow;

pub use analysis::{AnalysisProvider, AnalysisResult, AnalysisSettings, StubAnalysisProvider};
pub use capture::ImageVault;
pub use config::{load_config, Config};
pub use error::{
    AnalysisError, CaptureError, ConfigError, HerdscoreError, Result, StoreError, SyncError,
};
pub use logging::init_logging;
pub use model::{
    Assessment, ClassificationRecord, FailureKind, ImageRef, RecordStatus, TraitMeasurement,
    TraitUnit, Traits,
};
pub use query::{RecordFilter, RecordSummary, SortOrder};
pub use runtime::FieldStation;
pub use scoring::{BreedStandard, BreedStandards, ScoreGrade, TraitStandard};
pub use store::{RecordEvent, RecordStore};
pub use sync::{
    EngineError, InMemoryRemote, RemoteEndpoint, SubmitAck, SyncEngine, SyncHandle, SyncPayload,
    SyncReport, SyncSettings,
};
pub use workflow::{AnalysisOutcome, AnalysisTask, ClassificationWorkflow, WorkflowError};
