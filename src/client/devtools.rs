//! Dev-tools operation history
//!
//! Keeps a bounded log of operation metadata for inspection. Records copy
//! what they need out of the operation and never hold its context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::document::OperationKind;
use super::types::{Operation, OperationId, Variables};

/// How an operation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Pending,
    Succeeded,
    Failed { error: String },
    Unsubscribed,
}

/// One operation in the history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub kind: OperationKind,
    pub name: String,
    pub variables: Variables,
    pub had_context: bool,
    pub outcome: RecordOutcome,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Bounded operation history
#[derive(Debug)]
pub struct DevTools {
    capacity: usize,
    history: Mutex<VecDeque<OperationRecord>>,
}

impl DevTools {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Record the start of an operation
    pub fn record_start(&self, operation: &Operation) {
        let record = OperationRecord {
            id: operation.id,
            kind: operation.document.kind,
            name: operation.document.operation_name().to_string(),
            variables: operation.variables.clone(),
            had_context: operation.context.is_some(),
            outcome: RecordOutcome::Pending,
            started_at: Utc::now(),
            finished_at: None,
        };

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Record how an operation ended
    pub fn record_finish(&self, id: OperationId, outcome: RecordOutcome) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = history.iter_mut().rev().find(|r| r.id == id) {
            record.outcome = outcome;
            record.finished_at = Some(Utc::now());
        }
    }

    /// Snapshot of the history, oldest first
    pub fn history(&self) -> Vec<OperationRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::document::Document;
    use crate::client::types::Context;
    use std::sync::Arc;

    fn operation(id: u64, context: bool) -> Operation {
        Operation {
            id: OperationId(id),
            document: Arc::new(Document::parse("mutation updateUser { updateUser { id } }").unwrap()),
            variables: Variables::new(),
            context: context.then(|| Arc::new(id) as Context),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let devtools = DevTools::new(2);
        for id in 0..5 {
            devtools.record_start(&operation(id, false));
        }

        let history = devtools.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, OperationId(3));
        assert_eq!(history[1].id, OperationId(4));
    }

    #[test]
    fn test_record_does_not_hold_context() {
        let devtools = DevTools::new(4);
        let op = operation(1, true);
        let context = op.context.clone().unwrap();

        devtools.record_start(&op);
        drop(op);
        devtools.record_finish(
            OperationId(1),
            RecordOutcome::Failed {
                error: "boom".to_string(),
            },
        );

        assert_eq!(Arc::strong_count(&context), 1);
        let history = devtools.history();
        let record = &history[0];
        assert!(record.had_context);
        assert_eq!(record.name, "updateUser");
        assert!(record.finished_at.is_some());
    }
}
