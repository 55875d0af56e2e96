//! Metrics hooks for broker operations
//!
//! Counters for submitted requests and how each one was resolved.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ic_broker::metrics::Metrics;
//!
//! let metrics = Arc::new(Metrics::new());
//! let session = BrokerSession::with_metrics(config, metrics.clone())?;
//! // ...
//! println!("{:?}", metrics.snapshot());
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{IoStatus, NotifyOutcome, TickOutcome};

/// Trait for custom metrics recording implementations
pub trait BrokerMetrics: Send + Sync {
    /// A request reached the broker
    fn record_submitted(&self);

    /// A request completed without being held
    fn record_inline_completion(&self, status: IoStatus);

    /// A request was held in the registry or the slot
    fn record_pended(&self);

    /// One notify attempt
    fn record_notify(&self, outcome: &NotifyOutcome);

    /// A write was accepted and stored
    fn record_write(&self, length: usize);

    /// One tick
    fn record_tick(&self, outcome: &TickOutcome);

    /// A cancel routine completed a held request
    fn record_cancelled(&self);

    /// A read was rejected because the slot was occupied
    fn record_busy(&self);

    /// Requests completed by closing the session
    fn record_drained(&self, count: usize);
}

/// Atomic counter implementation
#[derive(Default, Debug)]
pub struct Metrics {
    pub submitted: AtomicU64,
    pub inline_completions: AtomicU64,
    pub pended: AtomicU64,
    pub deliveries_matched: AtomicU64,
    pub deliveries_failed: AtomicU64,
    pub writes: AtomicU64,
    pub bytes_written: AtomicU64,
    pub ticks: AtomicU64,
    pub tick_completions: AtomicU64,
    pub cancelled: AtomicU64,
    pub busy_rejections: AtomicU64,
    pub drained: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            inline_completions: self.inline_completions.load(Ordering::Relaxed),
            pended: self.pended.load(Ordering::Relaxed),
            deliveries_matched: self.deliveries_matched.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            tick_completions: self.tick_completions.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
        }
    }
}

impl BrokerMetrics for Metrics {
    fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_inline_completion(&self, _status: IoStatus) {
        self.inline_completions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_pended(&self) {
        self.pended.fetch_add(1, Ordering::Relaxed);
    }

    fn record_notify(&self, outcome: &NotifyOutcome) {
        match outcome {
            NotifyOutcome::NoPendingWaiters => {}
            NotifyOutcome::Matched { .. } => {
                self.deliveries_matched.fetch_add(1, Ordering::Relaxed);
            }
            NotifyOutcome::MatchedButBufferInvalid { .. } => {
                self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_write(&self, length: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(length as u64, Ordering::Relaxed);
    }

    fn record_tick(&self, outcome: &TickOutcome) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if matches!(outcome, TickOutcome::Completed { .. }) {
            self.tick_completions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn record_busy(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drained(&self, count: usize) {
        self.drained.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub inline_completions: u64,
    pub pended: u64,
    pub deliveries_matched: u64,
    pub deliveries_failed: u64,
    pub writes: u64,
    pub bytes_written: u64,
    pub ticks: u64,
    pub tick_completions: u64,
    pub cancelled: u64,
    pub busy_rejections: u64,
    pub drained: u64,
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default, Debug)]
pub struct NoOpMetrics;

impl BrokerMetrics for NoOpMetrics {
    fn record_submitted(&self) {}
    fn record_inline_completion(&self, _: IoStatus) {}
    fn record_pended(&self) {}
    fn record_notify(&self, _: &NotifyOutcome) {}
    fn record_write(&self, _: usize) {}
    fn record_tick(&self, _: &TickOutcome) {}
    fn record_cancelled(&self) {}
    fn record_busy(&self) {}
    fn record_drained(&self, _: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PrecomputedResult, RequestId};

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_notify_outcomes_counted_separately() {
        let metrics = Metrics::new();
        let id = RequestId::new();
        metrics.record_notify(&NotifyOutcome::Matched {
            request_id: id,
            bytes_copied: 5,
        });
        metrics.record_notify(&NotifyOutcome::MatchedButBufferInvalid { request_id: id });
        metrics.record_notify(&NotifyOutcome::NoPendingWaiters);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.deliveries_matched, 1);
        assert_eq!(snapshot.deliveries_failed, 1);
    }

    #[test]
    fn test_idle_ticks_are_not_completions() {
        let metrics = Metrics::new();
        metrics.record_tick(&TickOutcome::Idle);
        metrics.record_tick(&TickOutcome::Completed {
            request_id: RequestId::new(),
            result: PrecomputedResult::success(3),
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.tick_completions, 1);
    }
}
