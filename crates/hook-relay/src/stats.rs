//! Atomic relay counters.
//!
//! Monotonic display counters with no synchronization requirements, so all
//! atomics use `Relaxed` ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Default)]
struct StatsInner {
    received: AtomicU64,
    relayed: AtomicU64,
    failed: AtomicU64,
    destinations_contacted: AtomicU64,
}

/// Thread-safe relay statistics. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct RelayStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current counter values, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub relayed: u64,
    pub failed: u64,
    pub destinations_contacted: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivery that reached every selected destination.
    pub fn record_relayed(&self, destinations: usize) {
        self.inner.relayed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .destinations_contacted
            .fetch_add(destinations as u64, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.inner.received.load(Ordering::Relaxed),
            relayed: self.inner.relayed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            destinations_contacted: self.inner.destinations_contacted.load(Ordering::Relaxed),
        }
    }
}
