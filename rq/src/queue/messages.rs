//! Message and snapshot types for queue instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::domain::Priority;

use super::executor::{BoxJob, Outcome};
use super::store::EntryId;

/// Internal requests to a queue instance task
pub(crate) enum QueueRequest {
    /// Add a new entry to the waiting store
    Enqueue {
        id: EntryId,
        priority: Priority,
        job: BoxJob,
    },

    /// A dispatched entry settled; release its slot
    Settled { id: EntryId, outcome: Outcome },

    /// Reject a still-waiting entry
    Cancel {
        id: EntryId,
        reply_tx: oneshot::Sender<bool>,
    },

    /// Point-in-time counts
    GetStatus { reply_tx: oneshot::Sender<QueueStatus> },

    /// Every waiting and processing entry
    GetDetails {
        reply_tx: oneshot::Sender<Vec<EntrySnapshot>>,
    },

    /// Reject everything waiting and stop the instance
    Shutdown { reply_tx: oneshot::Sender<()> },
}

/// Cumulative counters for one queue instance
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_dispatched: u64,
    pub total_resolved: u64,
    pub total_failed: u64,
    pub total_timed_out: u64,
    pub total_panicked: u64,
    pub total_cancelled: u64,
    pub total_abandoned: u64,
    pub total_rate_limited: u64,
    /// Sum of time entries spent waiting before dispatch
    pub total_wait_time_ms: u64,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
}

impl QueueStats {
    pub fn total_settled(&self) -> u64 {
        self.total_resolved + self.total_failed + self.total_timed_out + self.total_panicked
    }

    /// Mean time from enqueue to dispatch
    pub fn avg_wait_ms(&self) -> Option<u64> {
        (self.total_dispatched > 0).then(|| self.total_wait_time_ms / self.total_dispatched)
    }
}

/// Snapshot of one queue instance
///
/// `total` always equals `queued + processing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub identifier: String,
    pub queued: usize,
    pub processing: usize,
    pub total: usize,
    /// The rate window is exhausted
    #[serde(rename = "rate-limited")]
    pub rate_limited: bool,
    pub stats: QueueStats,
    #[serde(rename = "taken-at")]
    pub taken_at: DateTime<Utc>,
}

impl QueueStatus {
    pub fn new(identifier: impl Into<String>, queued: usize, processing: usize) -> Self {
        Self {
            identifier: identifier.into(),
            queued,
            processing,
            total: queued + processing,
            rate_limited: false,
            stats: QueueStats::default(),
            taken_at: Utc::now(),
        }
    }

    /// Status of an identifier that has never been used
    pub fn idle(identifier: impl Into<String>) -> Self {
        Self::new(identifier, 0, 0)
    }
}

/// Status of an entry in a details listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Waiting,
    Processing,
}

/// One entry in a details listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub id: EntryId,
    pub priority: Priority,
    pub status: EntryStatus,
    /// Time since enqueue (waiting) or since dispatch (processing)
    #[serde(rename = "elapsed-ms")]
    pub elapsed_ms: u64,
}
