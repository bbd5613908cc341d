//! Scenario driver
//!
//! Runs one scenario through its fixed lifecycle:
//!
//! ```text
//! Init -> Armed -> Operating -> Releasing -> AwaitingCollection -> Passed | TimedOut
//! ```
//!
//! `Failed` replaces the terminal state when the driver cannot reach its
//! release point, e.g. a subscription stream that ends before its event.
//! Whatever happens while operating, every handle is released and a
//! collection is requested before the scenario ends.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::adjudicator::{adjudicate, Verdict};
use super::fixtures::{Fixture, UPDATE_USER_MUTATION, USER_QUERY, USER_UPDATED_SUBSCRIPTION};
use super::handles::{OperationHandles, ReleaseStep};
use crate::client::{ClientError, ClientOptions, ClientStats, Request};
use crate::config::DiagnosticsConfig;
use crate::diagnostics::{delayed_label, DiagnosticCapture, SnapshotWriter};
use crate::error::{LeakProbeError, Result};
use crate::probe::{Collector, ProbeTarget};

/// Which client calls a scenario makes while operating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallShape {
    /// One mutation whose resolver always fails
    FailingMutation,
    /// Watch a query, then run the failing mutation with the same context
    WatchThenMutate,
    /// Subscribe and wait for one published event
    PushSubscription,
    /// Watch a query and wait for its first result
    WatchOnly,
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FailingMutation => "failing mutation",
            Self::WatchThenMutate => "watch then mutate",
            Self::PushSubscription => "push subscription",
            Self::WatchOnly => "watch only",
        };
        f.write_str(name)
    }
}

/// Everything needed to run one scenario
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    pub shape: CallShape,
    pub client: ClientOptions,
    pub timeout: Duration,
    pub snapshot_prefix: String,
    pub publish_delay: Duration,
}

impl ScenarioSpec {
    pub fn new(name: impl Into<String>, shape: CallShape, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            shape,
            client: ClientOptions::default(),
            timeout,
            snapshot_prefix: String::new(),
            publish_delay: Duration::ZERO,
        }
    }

    pub fn with_client(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }

    pub fn with_snapshot_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.snapshot_prefix = prefix.into();
        self
    }

    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Init,
    Armed,
    Operating,
    Releasing,
    AwaitingCollection,
    Passed,
    TimedOut,
    Failed,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Armed => "ARMED",
            Self::Operating => "OPERATING",
            Self::Releasing => "RELEASING",
            Self::AwaitingCollection => "AWAITING_COLLECTION",
            Self::Passed => "PASSED",
            Self::TimedOut => "TIMED_OUT",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    Passed,
    TimedOut,
    Failed { reason: String },
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    fn terminal_state(&self) -> ScenarioState {
        match self {
            Self::Passed => ScenarioState::Passed,
            Self::TimedOut => ScenarioState::TimedOut,
            Self::Failed { .. } => ScenarioState::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::TimedOut => f.write_str("timed out (context still reachable)"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub shape: CallShape,
    pub outcome: Outcome,
    pub transitions: Vec<ScenarioState>,
    pub release_steps: Vec<ReleaseStep>,
    pub elapsed: Duration,
    /// Time from the collection request to the verdict
    pub collection_wait: Duration,
    /// Client counters right after release
    pub client_stats: ClientStats,
    /// Snapshots taken when collection was requested
    pub snapshots: Vec<PathBuf>,
}

impl ScenarioReport {
    pub fn final_state(&self) -> Option<ScenarioState> {
        self.transitions.last().copied()
    }
}

struct Transitions {
    scenario: String,
    states: Vec<ScenarioState>,
}

impl Transitions {
    fn new(scenario: &str) -> Self {
        let mut transitions = Self {
            scenario: scenario.to_string(),
            states: Vec::new(),
        };
        transitions.enter(ScenarioState::Init);
        transitions
    }

    fn enter(&mut self, state: ScenarioState) {
        debug!(scenario = %self.scenario, state = %state, "Scenario transition");
        self.states.push(state);
    }
}

/// Runs scenarios against a shared collector
pub struct ScenarioDriver<'a> {
    collector: &'a Collector,
    diagnostics: DiagnosticsConfig,
    writer: Arc<dyn SnapshotWriter>,
    deferred: Vec<JoinHandle<Option<PathBuf>>>,
}

impl<'a> ScenarioDriver<'a> {
    pub fn new(
        collector: &'a Collector,
        diagnostics: DiagnosticsConfig,
        writer: Arc<dyn SnapshotWriter>,
    ) -> Self {
        Self {
            collector,
            diagnostics,
            writer,
            deferred: Vec::new(),
        }
    }

    /// Run one scenario to its terminal state
    pub async fn run(&mut self, spec: &ScenarioSpec) -> ScenarioReport {
        let started = Instant::now();
        let mut transitions = Transitions::new(&spec.name);
        info!(scenario = %spec.name, shape = %spec.shape, "Starting scenario");

        let fixture = Fixture::new(spec.client.clone());
        let target = ProbeTarget::new(spec.name.clone());

        let notice = self.collector.watch(&target, spec.name.clone());
        let deadline = started + spec.timeout;
        let mut handles = OperationHandles::new(target);
        transitions.enter(ScenarioState::Armed);

        transitions.enter(ScenarioState::Operating);
        let operated = match timeout_at(deadline, operate(spec, &fixture, &mut handles)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Outcome::Failed {
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!(scenario = %spec.name, "Operating phase hit the deadline");
                Err(Outcome::TimedOut)
            }
        };

        transitions.enter(ScenarioState::Releasing);
        let release_steps = handles.release();
        let client_stats = fixture.client.stats();

        transitions.enter(ScenarioState::AwaitingCollection);
        let awaiting = Instant::now();
        self.collector.force_collection();

        let capture = DiagnosticCapture::new(
            &self.diagnostics,
            spec.name.clone(),
            spec.snapshot_prefix.clone(),
            self.writer.clone(),
        )
        .with_source("client", Arc::new(fixture.client.clone()))
        .with_source("collector", self.collector.stats_source());

        // Snapshot writes run alongside adjudication
        let mut done = None;
        if capture.is_enabled() {
            done = Some(capture.schedule("done".to_string(), Duration::ZERO));
            let delay = self.diagnostics.delayed_capture;
            self.deferred
                .push(capture.schedule(delayed_label(delay), delay));
        }

        let outcome = match operated {
            Err(outcome) => outcome,
            Ok(()) => match adjudicate(notice, deadline).await {
                Verdict::Collected { .. } => Outcome::Passed,
                Verdict::TimedOut => Outcome::TimedOut,
                Verdict::Abandoned { reason } => Outcome::Failed { reason },
            },
        };
        let collection_wait = awaiting.elapsed();
        transitions.enter(outcome.terminal_state());

        let mut snapshots = Vec::new();
        if let Some(done) = done {
            match done.await {
                Ok(path) => snapshots.extend(path),
                Err(e) => warn!(scenario = %spec.name, "Snapshot task failed: {}", e),
            }
        }

        // The client may root the context; keep it until the verdict is in
        drop(fixture);

        let elapsed = started.elapsed();
        info!(
            scenario = %spec.name,
            outcome = %outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "Scenario finished"
        );

        ScenarioReport {
            name: spec.name.clone(),
            shape: spec.shape,
            outcome,
            transitions: transitions.states,
            release_steps,
            elapsed,
            collection_wait,
            client_stats,
            snapshots,
        }
    }

    /// Wait for every scheduled follow-up capture and return the files written
    pub async fn flush_captures(&mut self) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for handle in self.deferred.drain(..) {
            match handle.await {
                Ok(Some(path)) => written.push(path),
                Ok(None) => {}
                Err(e) => warn!("Delayed capture task failed: {}", e),
            }
        }
        written
    }
}

async fn operate(
    spec: &ScenarioSpec,
    fixture: &Fixture,
    handles: &mut OperationHandles,
) -> Result<()> {
    match spec.shape {
        CallShape::FailingMutation => failing_mutation(fixture, handles).await,

        CallShape::WatchThenMutate => {
            watch_user(fixture, handles)?;
            failing_mutation(fixture, handles).await
        }

        CallShape::PushSubscription => {
            let request = Request::new(USER_UPDATED_SUBSCRIPTION)?.with_context(handles.context()?);
            handles.hold_subscription(fixture.client.subscribe(request)?);
            let publisher = fixture.schedule_publish(spec.publish_delay);

            let received = match handles.subscription_mut() {
                Some(subscription) => subscription.next().await,
                None => None,
            };
            publisher.abort();

            match received {
                Some(Ok(data)) => {
                    debug!(scenario = %spec.name, %data, "Subscription event received");
                    Ok(())
                }
                Some(Err(e)) => Err(e.into()),
                None => Err(LeakProbeError::Scenario(
                    "subscription stream ended before its event".to_string(),
                )),
            }
        }

        CallShape::WatchOnly => {
            watch_user(fixture, handles)?;
            let first = match handles.query_subscription_mut() {
                Some(observer) => observer.next().await,
                None => None,
            };

            match first {
                Some(result) => {
                    debug!(scenario = %spec.name, source = ?result.source, "First query result");
                    Ok(())
                }
                None => Err(LeakProbeError::Scenario(
                    "watched query closed before its first result".to_string(),
                )),
            }
        }
    }
}

fn watch_user(fixture: &Fixture, handles: &mut OperationHandles) -> Result<()> {
    let request = Request::new(USER_QUERY)?.with_context(handles.context()?);
    let query = fixture.client.watch_query(request)?;
    let observer = query.subscribe();
    handles.hold_query(query, observer);
    Ok(())
}

/// The mutation is expected to fail; its failure is the signal to release
async fn failing_mutation(fixture: &Fixture, handles: &OperationHandles) -> Result<()> {
    let request = Request::new(UPDATE_USER_MUTATION)?.with_context(handles.context()?);

    match fixture.client.mutate(request).await {
        Err(ClientError::GraphQL(errors)) => {
            debug!(errors = errors.len(), "Mutation failed as expected");
            Ok(())
        }
        Err(e) => Err(e.into()),
        Ok(data) => {
            warn!(%data, "Mutation unexpectedly succeeded");
            Ok(())
        }
    }
}
