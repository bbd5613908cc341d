//! Common test utilities and helpers

#![allow(dead_code)]

use leakprobe::client::{ClientOptions, GraphQLClient, PubSub, SchemaLink};
use leakprobe::harness::mock_schema;
use leakprobe::{CollectorConfig, DiagnosticsConfig, HarnessConfig, ScenarioConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Harness config with short deadlines and a fast sweeper
pub fn fast_config(snapshot_dir: &Path) -> HarnessConfig {
    HarnessConfig {
        collector: CollectorConfig {
            sweep_interval: Duration::from_millis(10),
        },
        diagnostics: DiagnosticsConfig {
            enabled: true,
            output_dir: snapshot_dir.to_path_buf(),
            delayed_capture: Duration::from_millis(20),
        },
        scenarios: ScenarioConfig {
            single_request_timeout: Duration::from_secs(5),
            multi_step_timeout: Duration::from_secs(10),
            publish_delay: Duration::from_millis(50),
        },
    }
}

/// Same as [`fast_config`] with snapshots turned off
pub fn quiet_config() -> HarnessConfig {
    let mut config = fast_config(Path::new("unused"));
    config.diagnostics.enabled = false;
    config
}

/// Client over a fresh mock schema, plus the pub/sub hub that feeds it
pub fn create_test_client(options: ClientOptions) -> (GraphQLClient, PubSub) {
    let pubsub = PubSub::default();
    let schema = Arc::new(mock_schema(pubsub.clone()));
    let client = GraphQLClient::new(Arc::new(SchemaLink::new(schema)), options);
    (client, pubsub)
}

/// Poll until `weak` has no strong references left, or give up
pub async fn wait_until_dropped<T: ?Sized>(weak: &std::sync::Weak<T>, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while weak.strong_count() > 0 {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}
