//! Diagnostic utilities
//!
//! This module provides tools for inspecting scenario state offline:
//! - Process-wide probe target accounting
//! - Named, timestamped JSON snapshots at scenario checkpoints

pub mod snapshot;
pub mod targets;

pub use snapshot::{
    delayed_label, DiagnosticCapture, JsonSnapshotWriter, SnapshotSource, SnapshotWriter,
};
pub use targets::{global_target_tracker, TargetSnapshot, TargetTracker};
