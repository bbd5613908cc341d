//! Race a collection notice against the scenario deadline

use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::probe::CollectionNotice;

/// What the adjudicator concluded for one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    /// Probe fired; `after` is measured from the start of adjudication
    Collected { after: Duration },
    /// Deadline elapsed first; the target is still reachable
    TimedOut,
    /// The collector went away before the probe could fire
    Abandoned { reason: String },
}

/// Wait for `notice` until `deadline`. First outcome wins; the notice is
/// preferred when both are ready.
pub async fn adjudicate(notice: CollectionNotice, deadline: Instant) -> Verdict {
    let started = Instant::now();
    let probe = notice.probe();

    let verdict = tokio::select! {
        biased;

        result = notice.collected() => match result {
            Ok(()) => Verdict::Collected { after: started.elapsed() },
            Err(e) => Verdict::Abandoned {
                reason: e.to_string(),
            },
        },

        _ = sleep_until(deadline) => Verdict::TimedOut,
    };

    match &verdict {
        Verdict::Collected { after } => {
            debug!(probe = %probe, after_ms = after.as_millis() as u64, "Probe fired")
        }
        Verdict::TimedOut => warn!(probe = %probe, "Deadline elapsed before probe fired"),
        Verdict::Abandoned { reason } => warn!(probe = %probe, "Probe abandoned: {}", reason),
    }

    verdict
}
