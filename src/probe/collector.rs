//! Probe collector
//!
//! Plays the role of the host collector for weak probes:
//! - Holds one `Weak` liveness check per probe, never a strong reference
//! - Sweeps on a fixed interval and whenever collection is requested
//! - Invokes each probe callback at most once, from its own task, after a
//!   sweep observes the target gone
//!
//! `force_collection` is advisory. It wakes the sweeper and returns at once;
//! the callback firing is the only evidence that a target was reclaimed.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::CollectorConfig;
use crate::diagnostics::SnapshotSource;
use crate::error::{LeakProbeError, Result};

/// Identifier of an attached probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProbeId(pub u64);

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probe-{}", self.0)
    }
}

/// Shortest sweep interval; `tokio::time::interval` rejects zero
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

type LivenessCheck = Box<dyn Fn() -> bool + Send + Sync>;
type CollectedCallback = Box<dyn FnOnce() + Send>;

struct ProbeEntry {
    id: ProbeId,
    label: String,
    is_alive: LivenessCheck,
    on_collected: Option<CollectedCallback>,
}

/// Collector counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    pub sweeps: u64,
    pub forced_requests: u64,
    pub attached: u64,
    pub fired: u64,
    pub pending: usize,
}

struct Shared {
    probes: Mutex<Vec<ProbeEntry>>,
    wake: Notify,
    next_id: AtomicU64,
    sweeps: AtomicU64,
    forced_requests: AtomicU64,
    attached: AtomicU64,
    fired: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            probes: Mutex::new(Vec::new()),
            wake: Notify::new(),
            next_id: AtomicU64::new(1),
            sweeps: AtomicU64::new(0),
            forced_requests: AtomicU64::new(0),
            attached: AtomicU64::new(0),
            fired: AtomicU64::new(0),
        }
    }

    /// Remove probes whose targets are gone and run their callbacks
    fn sweep(&self) -> usize {
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        let collected: Vec<ProbeEntry> = {
            let mut probes = self.probes.lock().unwrap_or_else(PoisonError::into_inner);
            let (dead, alive): (Vec<_>, Vec<_>) =
                probes.drain(..).partition(|probe| !(probe.is_alive)());
            *probes = alive;
            dead
        };

        // Callbacks run outside the lock so they may attach new probes
        let mut fired = 0;
        for mut probe in collected {
            if let Some(callback) = probe.on_collected.take() {
                debug!(probe = %probe.id, label = %probe.label, "Probe target collected");
                self.fired.fetch_add(1, Ordering::Relaxed);
                // Callback panics stay out of the sweeper
                if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    warn!(probe = %probe.id, label = %probe.label, "Probe callback panicked");
                }
                fired += 1;
            }
        }

        trace!(fired, "Sweep finished");
        fired
    }

    fn stats(&self) -> CollectorStats {
        CollectorStats {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            forced_requests: self.forced_requests.load(Ordering::Relaxed),
            attached: self.attached.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            pending: self
                .probes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

/// Resolves once the watched target has been collected
pub struct CollectionNotice {
    probe: ProbeId,
    rx: oneshot::Receiver<()>,
}

impl CollectionNotice {
    pub fn probe(&self) -> ProbeId {
        self.probe
    }

    /// Wait for the probe to fire. Fails if the collector shuts down first.
    pub async fn collected(self) -> Result<()> {
        let probe = self.probe;
        self.rx.await.map_err(|_| {
            LeakProbeError::CollectorStopped(format!("{} abandoned before firing", probe))
        })
    }
}

/// Weak-probe registry with a background sweeper task
pub struct Collector {
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Collector {
    /// Create the collector and spawn its sweeper. Must be called from
    /// within a Tokio runtime.
    pub fn start(config: &CollectorConfig) -> Self {
        let sweep_interval = if config.sweep_interval < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = config.sweep_interval.as_millis() as u64,
                "Sweep interval too short, using the minimum"
            );
            MIN_SWEEP_INTERVAL
        } else {
            config.sweep_interval
        };

        let shared = Arc::new(Shared::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task_handle = tokio::spawn(run_sweeper(shared.clone(), sweep_interval, shutdown_rx));

        info!(
            sweep_interval_ms = sweep_interval.as_millis() as u64,
            "Collector started"
        );

        Self {
            shared,
            shutdown_tx,
            task_handle: Some(task_handle),
        }
    }

    /// Register `on_collected` to run once `target` has no strong references
    pub fn attach<T, F>(&self, target: &Arc<T>, label: impl Into<String>, on_collected: F) -> ProbeId
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        let weak = Arc::downgrade(target);
        let id = ProbeId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let label = label.into();

        debug!(probe = %id, label = %label, "Probe attached");
        self.shared
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProbeEntry {
                id,
                label,
                is_alive: Box::new(move || weak.strong_count() > 0),
                on_collected: Some(Box::new(on_collected)),
            });
        self.shared.attached.fetch_add(1, Ordering::Relaxed);

        id
    }

    /// Attach a probe whose firing is observed through a notice
    pub fn watch<T>(&self, target: &Arc<T>, label: impl Into<String>) -> CollectionNotice
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let probe = self.attach(target, label, move || {
            let _ = tx.send(());
        });
        CollectionNotice { probe, rx }
    }

    /// Ask for a sweep soon. Advisory; never waits for the sweep.
    pub fn force_collection(&self) {
        self.shared.forced_requests.fetch_add(1, Ordering::Relaxed);
        self.shared.wake.notify_one();
    }

    /// Number of probes that have not fired yet
    pub fn pending(&self) -> usize {
        self.shared
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> CollectorStats {
        self.shared.stats()
    }

    /// Snapshot source reporting this collector's counters
    pub fn stats_source(&self) -> Arc<dyn SnapshotSource> {
        Arc::new(CollectorStatsSource {
            shared: self.shared.clone(),
        })
    }

    /// Stop the sweeper and wait for it to exit. Unfired probes are dropped.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.task_handle.take() {
            handle.await.map_err(|e| {
                LeakProbeError::CollectorStopped(format!("Failed to stop sweeper: {}", e))
            })?;
        }

        info!("Collector stopped");
        Ok(())
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            let _ = self.shutdown_tx.send(());
        }
    }
}

struct CollectorStatsSource {
    shared: Arc<Shared>,
}

impl SnapshotSource for CollectorStatsSource {
    fn snapshot_state(&self) -> Value {
        serde_json::to_value(self.shared.stats()).unwrap_or(Value::Null)
    }
}

async fn run_sweeper(
    shared: Arc<Shared>,
    sweep_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut timer = interval(sweep_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                shared.sweep();
            }

            _ = shared.wake.notified() => {
                trace!("Forced collection requested");
                shared.sweep();
            }

            _ = shutdown_rx.recv() => {
                debug!("Sweeper received shutdown signal");
                break;
            }
        }
    }

    // Drop pending probes now so their notices resolve as abandoned
    shared
        .probes
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
