//! Change notifications for record listeners.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::RecordStatus;

/// Emitted after a record change has been durably committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvent {
    pub record_id: String,
    /// Status before the change; `None` for a newly created record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<RecordStatus>,
    pub status: RecordStatus,
    pub updated_at: DateTime<Utc>,
}

impl RecordEvent {
    pub fn is_status_change(&self) -> bool {
        self.previous != Some(self.status)
    }
}

/// Fan-out of record events to any number of subscribers.
#[derive(Clone)]
pub struct RecordEventBroadcaster {
    sender: Arc<broadcast::Sender<RecordEvent>>,
}

impl RecordEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: RecordEvent) {
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.sender.subscribe()
    }
}
