//! Registry of watched queries and their observers
//!
//! A watched query stays registered while it has at least one observer.
//! When the last observer leaves, the entry is torn down and its request,
//! context included, is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::cache::InMemoryCache;
use super::types::{Context, OperationId, QueryResult, ResultSource};
use super::Request;

pub(crate) struct QueryInfo {
    request: Request,
    observers: HashMap<u64, mpsc::UnboundedSender<QueryResult>>,
    last_result: Option<QueryResult>,
}

pub(crate) struct QueryManager {
    queries: Mutex<HashMap<OperationId, QueryInfo>>,
    retained: Mutex<Vec<Context>>,
    retain_contexts: bool,
    next_observer: AtomicU64,
}

impl QueryManager {
    pub(crate) fn new(retain_contexts: bool) -> Self {
        Self {
            queries: Mutex::new(HashMap::new()),
            retained: Mutex::new(Vec::new()),
            retain_contexts,
            next_observer: AtomicU64::new(1),
        }
    }

    /// Add an observer, registering the query first if needed.
    ///
    /// A late observer immediately receives the latest result. Returns the
    /// observer id, its receiver and whether a fetch is needed.
    pub(crate) fn add_observer(
        &self,
        id: OperationId,
        request: &Request,
    ) -> (u64, mpsc::UnboundedReceiver<QueryResult>, bool) {
        let observer = self.next_observer.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut queries = self.queries.lock().unwrap_or_else(PoisonError::into_inner);
        let info = queries.entry(id).or_insert_with(|| QueryInfo {
            request: request.clone(),
            observers: HashMap::new(),
            last_result: None,
        });

        let needs_fetch = match &info.last_result {
            Some(last) => {
                let _ = tx.send(last.clone());
                false
            }
            None => info.observers.is_empty(),
        };
        info.observers.insert(observer, tx);

        trace!(query = %id, observer, needs_fetch, "Observer added");
        (observer, rx, needs_fetch)
    }

    /// Remove an observer; tears the query down when it was the last one
    pub(crate) fn remove_observer(&self, id: OperationId, observer: u64) -> usize {
        let torn_down = {
            let mut queries = self.queries.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(info) = queries.get_mut(&id) else {
                return 0;
            };
            info.observers.remove(&observer);
            if !info.observers.is_empty() {
                return info.observers.len();
            }
            queries.remove(&id)
        };

        if let Some(info) = torn_down {
            self.tear_down(id, info);
        }
        0
    }

    fn tear_down(&self, id: OperationId, info: QueryInfo) {
        debug!(query = %id, "Tearing down watched query");
        if self.retain_contexts {
            if let Some(context) = info.request.context {
                self.retained
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(context);
            }
        }
    }

    /// Deliver a result to every observer of a query
    pub(crate) fn deliver(&self, id: OperationId, result: QueryResult) -> usize {
        let mut queries = self.queries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(info) = queries.get_mut(&id) else {
            return 0;
        };

        info.observers.retain(|_, tx| tx.send(result.clone()).is_ok());
        info.last_result = Some(result);
        info.observers.len()
    }

    /// Re-read every watched query from the cache and notify on change
    pub(crate) fn broadcast(&self, cache: &InMemoryCache) -> usize {
        let mut notified = 0;
        let mut queries = self.queries.lock().unwrap_or_else(PoisonError::into_inner);

        for (id, info) in queries.iter_mut() {
            // Still waiting on its own first fetch
            if info.last_result.is_none() {
                continue;
            }
            let Some(data) = cache.read(&info.request.document) else {
                continue;
            };
            let unchanged = info
                .last_result
                .as_ref()
                .map(|last| last.data.as_ref() == Some(&data))
                .unwrap_or(false);
            if unchanged {
                continue;
            }

            let result = QueryResult {
                data: Some(data),
                errors: Vec::new(),
                source: ResultSource::Cache,
            };
            info.observers.retain(|_, tx| tx.send(result.clone()).is_ok());
            info.last_result = Some(result);
            notified += 1;
            trace!(query = %id, "Broadcast cache update");
        }

        notified
    }

    pub(crate) fn last_result(&self, id: OperationId) -> Option<QueryResult> {
        let queries = self.queries.lock().unwrap_or_else(PoisonError::into_inner);
        queries.get(&id).and_then(|info| info.last_result.clone())
    }

    pub(crate) fn watched_count(&self) -> usize {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|info| info.observers.len())
            .sum()
    }

    pub(crate) fn retained_count(&self) -> usize {
        self.retained.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
