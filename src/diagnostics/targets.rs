//! Probe target accounting
//!
//! Counts targets as they are created and dropped so snapshots can show how
//! many are still alive process-wide.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Target statistics tracker (thread-safe)
#[derive(Clone)]
pub struct TargetTracker {
    /// Targets created (cumulative)
    pub created: Arc<AtomicU64>,

    /// Targets dropped (cumulative)
    pub dropped: Arc<AtomicU64>,

    /// Targets currently alive
    pub live: Arc<AtomicUsize>,

    /// Highest number of simultaneously live targets
    pub peak_live: Arc<AtomicUsize>,
}

impl Default for TargetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetTracker {
    pub fn new() -> Self {
        Self {
            created: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            peak_live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record a target creation
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
        let current = self.live.fetch_add(1, Ordering::Relaxed) + 1;

        // Update peak if needed
        let mut peak = self.peak_live.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_live.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    /// Record a target drop
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            created: self.created.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            live: self.live.load(Ordering::Relaxed),
            peak_live: self.peak_live.load(Ordering::Relaxed),
        }
    }

    /// Log current target statistics
    pub fn log_statistics(&self) {
        let snapshot = self.snapshot();
        if snapshot.live > 0 {
            warn!(
                live = snapshot.live,
                created = snapshot.created,
                dropped = snapshot.dropped,
                "Probe targets still alive"
            );
        } else {
            info!(
                created = snapshot.created,
                peak_live = snapshot.peak_live,
                "All probe targets dropped"
            );
        }
    }
}

/// Target statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSnapshot {
    pub created: u64,
    pub dropped: u64,
    pub live: usize,
    pub peak_live: usize,
}

/// Global target tracker instance
static TARGET_TRACKER: once_cell::sync::Lazy<TargetTracker> =
    once_cell::sync::Lazy::new(TargetTracker::new);

/// Get the global target tracker
pub fn global_target_tracker() -> &'static TargetTracker {
    &TARGET_TRACKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts() {
        let tracker = TargetTracker::new();

        tracker.record_created();
        tracker.record_created();
        tracker.record_dropped();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.created, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.live, 1);
    }

    #[test]
    fn test_tracker_peak() {
        let tracker = TargetTracker::new();

        tracker.record_created();
        tracker.record_created();
        tracker.record_created();
        tracker.record_dropped();
        tracker.record_dropped();
        tracker.record_created();

        assert_eq!(tracker.snapshot().peak_live, 3); // Peak unchanged
        assert_eq!(tracker.snapshot().live, 2);
    }
}
