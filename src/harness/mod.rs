//! Leak scenario harness
//!
//! Builds fixtures, drives the client through each call shape with a probe
//! target as context, releases everything and adjudicates whether the target
//! was collected before the deadline.

pub mod adjudicator;
pub mod fixtures;
pub mod handles;
pub mod scenario;
pub mod suite;

pub use adjudicator::{adjudicate, Verdict};
pub use fixtures::{mock_schema, Fixture};
pub use handles::{OperationHandles, ReleaseStep};
pub use scenario::{
    CallShape, Outcome, ScenarioDriver, ScenarioReport, ScenarioSpec, ScenarioState,
};
pub use suite::{default_scenarios, run_scenarios, run_suite, select_scenarios, SuiteReport};
