//! Leakprobe - context retention harness for async GraphQL clients
//!
//! Checks that a request-scoped context passed through a client's query,
//! watch, mutate and subscribe calls becomes unreachable once the caller has
//! let go of it.
//!
//! # Architecture
//!
//! - **Probe**: weak-reference probes and the collector that fires them
//! - **Client**: the in-process GraphQL client under test, with its cache,
//!   watched queries, subscriptions and dev-tools history
//! - **Harness**: fixtures, scenario driver and outcome adjudication
//! - **Diagnostics**: named retention snapshots at scenario checkpoints
//!
//! # Example
//!
//! ```ignore
//! use leakprobe::{run_suite, HarnessConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarnessConfig::from_file("leakprobe.toml".as_ref())?;
//!     let report = run_suite(&config, &[]).await?;
//!     assert!(report.all_passed());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod harness;
pub mod probe;

// Re-export commonly used types
pub use client::{ClientOptions, ClientStats, Environment, GraphQLClient, Request};
pub use config::{CollectorConfig, DiagnosticsConfig, HarnessConfig, ScenarioConfig};
pub use error::{LeakProbeError, Result};
pub use harness::{
    run_suite, CallShape, Outcome, ScenarioDriver, ScenarioReport, ScenarioSpec, ScenarioState,
    SuiteReport,
};
pub use probe::{CollectionNotice, Collector, ProbeTarget};
