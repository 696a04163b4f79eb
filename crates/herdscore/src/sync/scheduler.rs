//! Background scheduling of sync passes.
//!
//! One loop per engine. It runs a pass when triggered manually, and with
//! auto sync also on every interval tick and after each commit.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::{EngineError, SyncEngine, SyncReport};
use crate::model::{ClassificationRecord, RecordStatus};

/// Handle to a running scheduler.
pub struct SyncHandle {
    engine: Arc<SyncEngine>,
    trigger: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SyncEngine {
    /// Starts the scheduler loop on the current tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> SyncHandle {
        let trigger = Arc::new(Notify::new());
        let task = tokio::spawn(run_scheduler(Arc::clone(self), Arc::clone(&trigger)));
        SyncHandle {
            engine: Arc::clone(self),
            trigger,
            task,
        }
    }
}

impl SyncHandle {
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Requests a pass as soon as the scheduler is idle.
    pub fn sync_now(&self) {
        self.trigger.notify_one();
    }

    /// Makes a failed record pending again and requests a pass.
    pub fn retry_now(&self, id: &str) -> Result<ClassificationRecord, EngineError> {
        let record = self.engine.retry_now(id)?;
        self.sync_now();
        Ok(record)
    }

    /// Stops the scheduler and waits for it to finish. In-flight attempts
    /// are interrupted.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        self.engine.shutdown();
        self.task
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))
    }
}

fn log_report(result: Result<SyncReport, EngineError>) {
    match result {
        Ok(report) if report.is_empty() => debug!("Nothing to sync"),
        Ok(report) => debug!(
            synced = report.synced(),
            failed = report.failed(),
            "Scheduled sync pass done"
        ),
        Err(e) => error!(error = %e, "Sync pass failed"),
    }
}

async fn run_scheduler(engine: Arc<SyncEngine>, trigger: Arc<Notify>) {
    let settings = engine.settings().clone();
    let token = engine.shutdown_token();
    let mut events = engine.store().subscribe();
    let mut events_open = true;

    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        auto_sync = settings.auto_sync,
        interval_secs = settings.interval.as_secs(),
        concurrency = settings.concurrency,
        "Sync scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = trigger.notified() => debug!("Sync pass requested"),
            _ = ticker.tick(), if settings.auto_sync => {}
            event = events.recv(), if settings.auto_sync && events_open => match event {
                Ok(event) if event.status == RecordStatus::PendingSync => {
                    debug!(record_id = %event.record_id, "Record queued for sync");
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => debug!(missed, "Record events lagged"),
                Err(RecvError::Closed) => {
                    events_open = false;
                    continue;
                }
            },
        }

        log_report(engine.run_pass().await);
    }

    info!("Sync scheduler stopped");
}
