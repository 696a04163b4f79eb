//! Field station: everything one device needs, wired from configuration.

use std::sync::Arc;

use crate::analysis::{AnalysisProvider, AnalysisSettings};
use crate::capture::ImageVault;
use crate::config::Config;
use crate::db::{Database, DATABASE_FILE};
use crate::error::{ConfigError, Result};
use crate::model::ClassificationRecord;
use crate::query::{self, RecordFilter, RecordSummary};
use crate::store::RecordStore;
use crate::sync::{RemoteEndpoint, SyncEngine, SyncHandle, SyncSettings};
use crate::workflow::ClassificationWorkflow;

/// Directory under the data directory that holds captured images.
pub const IMAGES_DIR: &str = "images";

pub struct FieldStation {
    config: Config,
    store: RecordStore,
    workflow: ClassificationWorkflow,
    engine: Arc<SyncEngine>,
}

impl FieldStation {
    /// Opens the database, resolves the device id and recovers sync
    /// attempts a previous run left unfinished.
    ///
    /// The sync scheduler is not started; see [`FieldStation::start_sync`].
    pub fn open(
        config: Config,
        provider: Arc<dyn AnalysisProvider>,
        remote: Arc<dyn RemoteEndpoint>,
    ) -> Result<Self> {
        let data_dir = config.data_dir().ok_or_else(|| ConfigError::Validation {
            message: "No data directory configured and no home directory found".to_string(),
        })?;

        let db = Database::open(&data_dir.join(DATABASE_FILE))?;
        let store = RecordStore::new(db);
        let device_id = store.device_id(config.device_id.as_deref())?;

        let standards = Arc::new(config.breed_standards());
        if standards.is_empty() {
            log::warn!("No breed standards configured; every record will score 0");
        }
        let workflow = ClassificationWorkflow::new(
            store.clone(),
            ImageVault::new(data_dir.join(IMAGES_DIR)),
            provider,
            standards,
            AnalysisSettings::from(&config.analysis),
            device_id.clone(),
        );

        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote,
            SyncSettings::from(&config.sync),
        ));
        let recovered = engine.recover_interrupted()?;

        log::info!(
            "Field station {} ready at {} ({} interrupted sync attempts recovered)",
            device_id,
            data_dir.display(),
            recovered
        );

        Ok(Self {
            config,
            store,
            workflow,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        self.workflow.device_id()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn workflow(&self) -> &ClassificationWorkflow {
        &self.workflow
    }

    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// The records listing.
    pub fn records(&self, filter: &RecordFilter) -> Result<Vec<ClassificationRecord>> {
        let all = self.store.list_all()?;
        Ok(filter.apply(&all))
    }

    pub fn summary(&self) -> Result<RecordSummary> {
        let all = self.store.list_all()?;
        Ok(query::summarize(&all, self.config.sync.attention_threshold))
    }

    /// Starts background sync. Requires a tokio runtime.
    pub fn start_sync(&self) -> SyncHandle {
        self.engine.spawn()
    }

    /// Cancels running analyses and in-flight sync attempts.
    pub fn shutdown(&self) {
        self.workflow.shutdown();
        self.engine.shutdown();
        log::info!("Field station {} shut down", self.device_id());
    }
}
