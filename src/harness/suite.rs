//! The default scenario suite and its runner

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::scenario::{CallShape, ScenarioDriver, ScenarioReport, ScenarioSpec};
use crate::client::{ClientOptions, Environment};
use crate::config::{HarnessConfig, ScenarioConfig};
use crate::diagnostics::{global_target_tracker, JsonSnapshotWriter, SnapshotWriter};
use crate::error::{LeakProbeError, Result};
use crate::probe::{Collector, CollectorStats};

/// The scenarios run by default, in order
pub fn default_scenarios(config: &ScenarioConfig) -> Vec<ScenarioSpec> {
    let single = config.single_request_timeout;

    vec![
        ScenarioSpec::new("failing-mutation-devtools", CallShape::FailingMutation, single)
            .with_snapshot_prefix("devtools-"),
        ScenarioSpec::new("failing-mutation-no-devtools", CallShape::FailingMutation, single)
            .with_client(ClientOptions {
                connect_to_dev_tools: Some(false),
                ..Default::default()
            })
            .with_snapshot_prefix("no-devtools-"),
        ScenarioSpec::new("failing-mutation-production", CallShape::FailingMutation, single)
            .with_client(ClientOptions {
                environment: Environment::Production,
                ..Default::default()
            })
            .with_snapshot_prefix("node-env-"),
        ScenarioSpec::new("watch-then-mutate", CallShape::WatchThenMutate, single)
            .with_snapshot_prefix("watch-mutate-"),
        ScenarioSpec::new(
            "push-subscription",
            CallShape::PushSubscription,
            config.multi_step_timeout,
        )
        .with_publish_delay(config.publish_delay)
        .with_snapshot_prefix("subscription-"),
        ScenarioSpec::new("watch-only", CallShape::WatchOnly, single)
            .with_snapshot_prefix("watch-only-"),
    ]
}

/// Keep the scenarios named in `filter`, in suite order. An empty filter
/// keeps everything; an unknown name is an error.
pub fn select_scenarios(
    scenarios: Vec<ScenarioSpec>,
    filter: &[String],
) -> Result<Vec<ScenarioSpec>> {
    if filter.is_empty() {
        return Ok(scenarios);
    }

    if let Some(unknown) = filter
        .iter()
        .find(|name| !scenarios.iter().any(|spec| &spec.name == *name))
    {
        return Err(LeakProbeError::ScenarioNotFound(unknown.clone()));
    }

    Ok(scenarios
        .into_iter()
        .filter(|spec| filter.contains(&spec.name))
        .collect())
}

/// Results of a suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
    pub delayed_snapshots: Vec<PathBuf>,
    pub collector: CollectorStats,
    pub elapsed: Duration,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(|report| report.outcome.is_passed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.scenarios
            .iter()
            .filter(|report| !report.outcome.is_passed())
    }
}

/// Run the default suite, optionally restricted to `filter`
pub async fn run_suite(config: &HarnessConfig, filter: &[String]) -> Result<SuiteReport> {
    let scenarios = select_scenarios(default_scenarios(&config.scenarios), filter)?;
    run_scenarios(config, &scenarios, Arc::new(JsonSnapshotWriter)).await
}

/// Run `scenarios` in order, one at a time, against one collector
pub async fn run_scenarios(
    config: &HarnessConfig,
    scenarios: &[ScenarioSpec],
    writer: Arc<dyn SnapshotWriter>,
) -> Result<SuiteReport> {
    config.validate()?;

    let started = Instant::now();
    let collector = Collector::start(&config.collector);
    info!(scenarios = scenarios.len(), "Running leak scenarios");

    let mut reports = Vec::with_capacity(scenarios.len());
    let delayed_snapshots = {
        let mut driver = ScenarioDriver::new(&collector, config.diagnostics.clone(), writer);
        for spec in scenarios {
            let report = driver.run(spec).await;
            if !report.outcome.is_passed() {
                warn!(scenario = %report.name, outcome = %report.outcome, "Scenario did not pass");
            }
            reports.push(report);
        }
        driver.flush_captures().await
    };

    let collector_stats = collector.stats();
    collector.shutdown().await?;
    global_target_tracker().log_statistics();

    let report = SuiteReport {
        scenarios: reports,
        delayed_snapshots,
        collector: collector_stats,
        elapsed: started.elapsed(),
    };
    info!(
        passed = report.scenarios.len() - report.failures().count(),
        failed = report.failures().count(),
        "Suite finished"
    );
    Ok(report)
}
