//! Checkpoint snapshots
//!
//! A snapshot is a JSON document describing retention state at a named
//! checkpoint. Capturing is best effort: a failed write is logged and the
//! scenario carries on.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::targets::global_target_tracker;
use crate::client::GraphQLClient;
use crate::config::DiagnosticsConfig;
use crate::error::Result;

/// Something that can describe its current state for a snapshot
pub trait SnapshotSource: Send + Sync {
    fn snapshot_state(&self) -> Value;
}

impl SnapshotSource for GraphQLClient {
    fn snapshot_state(&self) -> Value {
        serde_json::to_value(self.stats()).unwrap_or(Value::Null)
    }
}

/// Persists a snapshot document
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    async fn write_snapshot(&self, label: &str, destination: &Path, snapshot: &Value) -> Result<()>;
}

/// Writes pretty-printed JSON files, creating the directory as needed
#[derive(Debug, Clone, Default)]
pub struct JsonSnapshotWriter;

#[async_trait]
impl SnapshotWriter for JsonSnapshotWriter {
    async fn write_snapshot(&self, label: &str, destination: &Path, snapshot: &Value) -> Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(destination, contents).await?;
        debug!(label, path = %destination.display(), "Snapshot written");
        Ok(())
    }
}

/// Label for the follow-up capture taken `delay` after release
pub fn delayed_label(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        format!("after-{}-seconds", delay.as_secs())
    } else {
        format!("after-{}-ms", delay.as_millis())
    }
}

/// Captures named snapshots for one scenario
#[derive(Clone)]
pub struct DiagnosticCapture {
    enabled: bool,
    output_dir: PathBuf,
    scenario: String,
    prefix: String,
    writer: Arc<dyn SnapshotWriter>,
    sources: Vec<(String, Arc<dyn SnapshotSource>)>,
}

impl DiagnosticCapture {
    pub fn new(
        config: &DiagnosticsConfig,
        scenario: impl Into<String>,
        prefix: impl Into<String>,
        writer: Arc<dyn SnapshotWriter>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            output_dir: config.output_dir.clone(),
            scenario: scenario.into(),
            prefix: prefix.into(),
            writer,
            sources: Vec::new(),
        }
    }

    /// Include a named source in every snapshot
    pub fn with_source(mut self, name: impl Into<String>, source: Arc<dyn SnapshotSource>) -> Self {
        self.sources.push((name.into(), source));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Where the snapshot for `label` lands
    pub fn destination(&self, label: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.snapshot.json", self.prefix, label))
    }

    fn build(&self, label: &str) -> Value {
        let mut sources = Map::new();
        for (name, source) in &self.sources {
            sources.insert(name.clone(), source.snapshot_state());
        }

        json!({
            "label": format!("{}{}", self.prefix, label),
            "scenario": self.scenario,
            "captured_at": Utc::now(),
            "targets": global_target_tracker().snapshot(),
            "sources": sources,
        })
    }

    /// Capture now. Returns the written path, or `None` when disabled or
    /// the write failed (the failure is logged).
    pub async fn capture(&self, label: &str) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }

        let destination = self.destination(label);
        let snapshot = self.build(label);
        let full_label = format!("{}{}", self.prefix, label);

        match self
            .writer
            .write_snapshot(&full_label, &destination, &snapshot)
            .await
        {
            Ok(()) => Some(destination),
            Err(e) => {
                error!(label = %full_label, "Failed to snapshot: {}", e);
                None
            }
        }
    }

    /// Capture once `delay` has elapsed, in the background
    pub fn schedule(&self, label: String, delay: Duration) -> tokio::task::JoinHandle<Option<PathBuf>> {
        let capture = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            capture.capture(&label).await
        })
    }
}
