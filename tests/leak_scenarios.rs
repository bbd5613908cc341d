//! End-to-end leak scenarios
//!
//! Runs every call shape through the driver against a real collector and
//! checks both the passing client and the known-leaking variant.

mod common;

use leakprobe::client::ClientOptions;
use leakprobe::diagnostics::JsonSnapshotWriter;
use leakprobe::harness::{
    run_scenarios, run_suite, CallShape, Outcome, ReleaseStep, ScenarioSpec, ScenarioState,
};
use leakprobe::LeakProbeError;
use std::sync::Arc;
use std::time::Duration;

fn leaking_client() -> ClientOptions {
    ClientOptions {
        retain_watched_contexts: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_default_suite_passes() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());

    let report = run_suite(&config, &[]).await.unwrap();

    assert_eq!(report.scenarios.len(), 6);
    for scenario in &report.scenarios {
        assert_eq!(
            scenario.outcome,
            Outcome::Passed,
            "{} did not pass",
            scenario.name
        );
        assert_eq!(
            scenario.transitions,
            vec![
                ScenarioState::Init,
                ScenarioState::Armed,
                ScenarioState::Operating,
                ScenarioState::Releasing,
                ScenarioState::AwaitingCollection,
                ScenarioState::Passed,
            ]
        );
        assert!(scenario.elapsed < Duration::from_secs(5));
    }
    assert!(report.all_passed());
    assert_eq!(report.collector.fired, 6);
    assert_eq!(report.collector.pending, 0);
}

#[tokio::test]
async fn test_snapshots_use_scenario_prefixes() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let filter = vec![
        "failing-mutation-devtools".to_string(),
        "failing-mutation-no-devtools".to_string(),
        "failing-mutation-production".to_string(),
    ];

    let report = run_suite(&config, &filter).await.unwrap();
    assert!(report.all_passed());

    for prefix in ["devtools-", "no-devtools-", "node-env-"] {
        let done = dir.path().join(format!("{}done.snapshot.json", prefix));
        let delayed = dir.path().join(format!("{}after-20-ms.snapshot.json", prefix));
        assert!(done.exists(), "missing {}", done.display());
        assert!(delayed.exists(), "missing {}", delayed.display());
    }
    assert_eq!(report.delayed_snapshots.len(), 3);

    let snapshot: serde_json::Value = serde_json::from_slice(
        &std::fs::read(dir.path().join("devtools-done.snapshot.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["scenario"], "failing-mutation-devtools");
    assert_eq!(snapshot["sources"]["client"]["devtools_records"], 1);
    assert_eq!(snapshot["sources"]["client"]["active_subscriptions"], 0);

    let snapshot: serde_json::Value = serde_json::from_slice(
        &std::fs::read(dir.path().join("node-env-done.snapshot.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["sources"]["client"]["devtools_records"], 0);
}

#[tokio::test]
async fn test_watch_only_leaks_with_retaining_client() {
    let config = common::quiet_config();
    let spec = ScenarioSpec::new("watch-only-leaky", CallShape::WatchOnly, Duration::from_millis(300))
        .with_client(leaking_client());

    let report = run_scenarios(&config, &[spec], Arc::new(JsonSnapshotWriter))
        .await
        .unwrap();

    let scenario = &report.scenarios[0];
    assert_eq!(scenario.outcome, Outcome::TimedOut);
    assert_eq!(scenario.final_state(), Some(ScenarioState::TimedOut));
    assert_eq!(scenario.client_stats.retained_contexts, 1);
    assert_eq!(scenario.client_stats.watched_queries, 0);
    assert!(!report.all_passed());
}

#[tokio::test]
async fn test_watch_only_passes_with_default_client() {
    let config = common::quiet_config();
    let spec = ScenarioSpec::new("watch-only", CallShape::WatchOnly, Duration::from_secs(5));

    let report = run_scenarios(&config, &[spec], Arc::new(JsonSnapshotWriter))
        .await
        .unwrap();

    let scenario = &report.scenarios[0];
    assert_eq!(scenario.outcome, Outcome::Passed);
    assert_eq!(
        scenario.release_steps,
        vec![
            ReleaseStep::UnsubscribedQueryObserver,
            ReleaseStep::DroppedQueryObserver,
            ReleaseStep::DroppedObservableQuery,
            ReleaseStep::DroppedTarget,
        ]
    );
    assert_eq!(scenario.client_stats.retained_contexts, 0);
    assert_eq!(scenario.client_stats.watched_queries, 0);
}

#[tokio::test]
async fn test_failing_mutation_unaffected_by_watched_query_retention() {
    let config = common::quiet_config();
    let spec = ScenarioSpec::new("mutation-only", CallShape::FailingMutation, Duration::from_secs(5))
        .with_client(leaking_client());

    let report = run_scenarios(&config, &[spec], Arc::new(JsonSnapshotWriter))
        .await
        .unwrap();
    assert_eq!(report.scenarios[0].outcome, Outcome::Passed);
}

#[tokio::test]
async fn test_push_subscription_releases_context() {
    let config = common::quiet_config();
    let spec = ScenarioSpec::new("push", CallShape::PushSubscription, Duration::from_secs(10))
        .with_publish_delay(Duration::from_millis(20));

    let report = run_scenarios(&config, &[spec], Arc::new(JsonSnapshotWriter))
        .await
        .unwrap();

    let scenario = &report.scenarios[0];
    assert_eq!(scenario.outcome, Outcome::Passed);
    assert_eq!(
        scenario.release_steps,
        vec![
            ReleaseStep::UnsubscribedSubscription,
            ReleaseStep::DroppedSubscription,
            ReleaseStep::DroppedTarget,
        ]
    );
    assert_eq!(scenario.client_stats.active_subscriptions, 0);
}

#[tokio::test]
async fn test_unknown_scenario_is_rejected() {
    let config = common::quiet_config();
    let err = run_suite(&config, &["does-not-exist".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, LeakProbeError::ScenarioNotFound(_)));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = common::quiet_config();
    config.scenarios.single_request_timeout = Duration::ZERO;

    let err = run_suite(&config, &[]).await.unwrap_err();
    assert!(matches!(err, LeakProbeError::Config(_)));
}
