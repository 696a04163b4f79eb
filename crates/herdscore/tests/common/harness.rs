//! Test harness for isolated field station runs.
//!
//! Each harness owns a temporary data directory and scriptable analysis and
//! remote doubles, so a test can reopen the station on the same data to
//! simulate a restart.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use herdscore::config::Config;
use herdscore::{
    ClassificationRecord, FieldStation, InMemoryRemote, RecordStatus, StubAnalysisProvider,
};

use super::builders::{png_bytes, ConfigBuilder};

pub struct TestHarness {
    temp_dir: TempDir,
    /// Data directory handed to every station opened by this harness.
    pub data_dir: PathBuf,
    /// Directory for config files written by tests.
    pub config_dir: PathBuf,
    pub provider: Arc<StubAnalysisProvider>,
    pub remote: Arc<InMemoryRemote>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_doubles(StubAnalysisProvider::default(), InMemoryRemote::new())
    }

    pub fn with_doubles(provider: StubAnalysisProvider, remote: InMemoryRemote) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("data");
        let config_dir = temp_dir.path().join("config");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        Self {
            temp_dir,
            data_dir,
            config_dir,
            provider: Arc::new(provider),
            remote: Arc::new(remote),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The default test config pointed at this harness's data directory.
    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new().data_directory(&self.data_dir.to_string_lossy())
    }

    pub fn open(&self) -> FieldStation {
        self.open_with(self.config().build())
    }

    pub fn open_with(&self, config: Config) -> FieldStation {
        FieldStation::open(config, self.provider.clone(), self.remote.clone())
            .expect("Failed to open field station")
    }

    pub fn write_config(&self, filename: &str, config: &Config) -> PathBuf {
        let path = self.config_dir.join(filename);
        let json = serde_json::to_string_pretty(config).expect("Failed to serialize config");
        std::fs::write(&path, json).expect("Failed to write config file");
        path
    }

    /// Captures, analyzes and commits one record.
    pub async fn committed_record(&self, station: &FieldStation) -> ClassificationRecord {
        let workflow = station.workflow();
        let draft = workflow.capture(&png_bytes()).expect("capture failed");
        workflow.analyze(draft.id()).await.expect("analysis failed");
        workflow.commit(draft.id()).expect("commit failed")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls until the record reaches `status` or two seconds pass.
pub async fn wait_for_status(station: &FieldStation, id: &str, status: RecordStatus) {
    for _ in 0..200 {
        if station.store().get(id).expect("record missing").status() == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("record {id} never reached {status:?}");
}
