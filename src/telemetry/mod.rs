//! Pipeline telemetry collector.
//!
//! The collector multiplexes capture, detection, cache and evaluation events
//! into a bounded history plus an async broadcast stream. One collector is
//! owned by each engine handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;

use crate::error::ErrorCode;

pub mod events;

pub use events::{PipelineEvent, TimedEvent};

/// Default broadcast buffer for live subscribers
pub const DEFAULT_TELEMETRY_BUFFER: usize = 256;

/// Default number of events kept for snapshots
pub const DEFAULT_TELEMETRY_HISTORY: usize = 64;

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<TimedEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

impl TelemetrySnapshot {
    /// Number of retained events of the given kind.
    pub fn count(&self, kind: &str) -> usize {
        self.recent
            .iter()
            .filter(|timed| timed.event.kind() == kind)
            .count()
    }
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<TimedEvent>,
    history: Mutex<VecDeque<TimedEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        let history_capacity = history_capacity.max(1);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<TimedEvent>> {
        // History is append-only bookkeeping; a poisoned lock still holds usable data.
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish(&self, event: PipelineEvent) {
        log::debug!("[Telemetry] {}", event.kind());
        let timed = TimedEvent {
            timestamp_ms: now_timestamp_ms(),
            event,
        };

        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history();
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(timed.clone());
        }

        let _ = self.tx.send(timed);
    }

    /// Publish a `CaptureFailed` event for `err`.
    pub fn record_capture_failure(&self, err: &dyn ErrorCode) {
        self.publish(PipelineEvent::CaptureFailed {
            code: err.code(),
            message: err.message(),
        });
    }

    /// Publish a `ReferenceRefreshFailed` event for `err`.
    pub fn record_refresh_failure(&self, err: &dyn ErrorCode) {
        self.publish(PipelineEvent::ReferenceRefreshFailed {
            code: err.code(),
            message: err.message(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.history();
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(DEFAULT_TELEMETRY_BUFFER, DEFAULT_TELEMETRY_HISTORY)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
