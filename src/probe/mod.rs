//! Weak-reachability probes
//!
//! A [`ProbeTarget`] is the disposable context object a scenario threads
//! through the client. The [`collector::Collector`] watches targets through
//! `Weak` references only, so attaching a probe never extends a target's
//! lifetime, and reports each target once after its last `Arc` is gone.

pub mod collector;

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use crate::client::Context;
use crate::diagnostics::global_target_tracker;

pub use collector::{CollectionNotice, Collector, CollectorStats, ProbeId};

/// Payload that makes targets easy to spot in snapshots
pub const MARKER_PAYLOAD: &str =
    "======================================================================================";

/// Disposable request-scoped object whose collection a scenario asserts
pub struct ProbeTarget {
    id: Uuid,
    label: String,
    marker: String,
    created_at: DateTime<Utc>,
}

impl ProbeTarget {
    /// Create a fresh target; the returned `Arc` is its only strong path
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        global_target_tracker().record_created();
        Arc::new(Self {
            id: Uuid::new_v4(),
            label: label.into(),
            marker: MARKER_PAYLOAD.to_string(),
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Type-erased handle for passing the target as call context
    pub fn as_context(self: &Arc<Self>) -> Context {
        self.clone()
    }
}

impl fmt::Debug for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeTarget")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Drop for ProbeTarget {
    fn drop(&mut self) {
        global_target_tracker().record_dropped();
        trace!(target_id = %self.id, label = %self.label, "Probe target dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_identity() {
        let a = ProbeTarget::new("a");
        let b = ProbeTarget::new("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.label(), "a");
        assert_eq!(a.marker(), MARKER_PAYLOAD);
    }

    #[test]
    fn test_context_shares_the_target() {
        let target = ProbeTarget::new("ctx");
        let context = target.as_context();
        assert_eq!(Arc::strong_count(&target), 2);

        let recovered = context.downcast_ref::<ProbeTarget>().unwrap();
        assert_eq!(recovered.id(), target.id());

        drop(context);
        assert_eq!(Arc::strong_count(&target), 1);
    }
}
