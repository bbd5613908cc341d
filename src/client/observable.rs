//! Handles returned by watched queries and push subscriptions
//!
//! Each handle keeps the client alive and may reference the caller's
//! context. `unsubscribe` is idempotent and also runs on drop.

use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use super::document::Document;
use super::error::ClientError;
use super::link::EventStream;
use super::types::{FetchPolicy, OperationId, QueryResult, ResultSource};
use super::{ClientInner, RecordOutcome, Request};

/// A query the client keeps up to date while it has observers
pub struct ObservableQuery {
    client: Arc<ClientInner>,
    id: OperationId,
    request: Request,
}

impl ObservableQuery {
    pub(crate) fn new(client: Arc<ClientInner>, id: OperationId, request: Request) -> Self {
        Self {
            client,
            id,
            request,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Start observing. Must be called from within a Tokio runtime when the
    /// result is not cached, since the network fetch runs as a task.
    pub fn subscribe(&self) -> QuerySubscription {
        let (observer, rx, needs_fetch) = self.client.queries.add_observer(self.id, &self.request);

        let subscription = QuerySubscription {
            client: self.client.clone(),
            query: self.id,
            observer,
            rx,
            active: true,
        };

        if needs_fetch {
            self.start_fetch();
        }

        subscription
    }

    /// Latest result delivered to observers
    pub fn current_result(&self) -> Option<QueryResult> {
        self.client.queries.last_result(self.id)
    }

    fn start_fetch(&self) {
        let policy = self
            .request
            .fetch_policy
            .unwrap_or(self.client.options.default_fetch_policy);

        if policy == FetchPolicy::CacheFirst {
            if let Some(data) = self.client.cache.read(&self.request.document) {
                trace!(query = %self.id, "Watched query served from cache");
                self.client.queries.deliver(
                    self.id,
                    QueryResult {
                        data: Some(data),
                        errors: Vec::new(),
                        source: ResultSource::Cache,
                    },
                );
                return;
            }
        }

        self.spawn_network_fetch();
    }

    fn spawn_network_fetch(&self) {
        let client = self.client.clone();
        let query = self.id;
        let operation = client.operation(client.next_id(), &self.request);

        tokio::spawn(async move {
            let result = match client.execute(operation).await {
                Ok(data) => QueryResult {
                    data: Some(data),
                    errors: Vec::new(),
                    source: ResultSource::Network,
                },
                Err(ClientError::GraphQL(errors)) => QueryResult {
                    data: None,
                    errors,
                    source: ResultSource::Network,
                },
                Err(e) => {
                    debug!(query = %query, "Watched query fetch failed: {}", e);
                    return;
                }
            };

            let delivered = client.queries.deliver(query, result);
            trace!(query = %query, delivered, "Network result delivered");
        });
    }
}

/// One observer of an [`ObservableQuery`]
pub struct QuerySubscription {
    client: Arc<ClientInner>,
    query: OperationId,
    observer: u64,
    rx: mpsc::UnboundedReceiver<QueryResult>,
    active: bool,
}

impl QuerySubscription {
    /// Wait for the next result; `None` once unsubscribed
    pub async fn next(&mut self) -> Option<QueryResult> {
        if !self.active {
            return None;
        }
        self.rx.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop observing. Calling this more than once has no further effect.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.rx.close();

        let remaining = self.client.queries.remove_observer(self.query, self.observer);
        debug!(query = %self.query, remaining, "Query observer unsubscribed");
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Push subscription over a link event stream
pub struct Subscription {
    client: Arc<ClientInner>,
    id: OperationId,
    document: Arc<Document>,
    stream: Option<EventStream>,
}

impl Subscription {
    pub(crate) fn new(
        client: Arc<ClientInner>,
        id: OperationId,
        document: Arc<Document>,
        stream: EventStream,
    ) -> Self {
        Self {
            client,
            id,
            document,
            stream: Some(stream),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Wait for the next event; `None` once unsubscribed or the stream ends
    pub async fn next(&mut self) -> Option<Result<Value, ClientError>> {
        let stream = self.stream.as_mut()?;
        let result = stream.next().await?;

        if !result.is_ok() {
            return Some(Err(ClientError::GraphQL(result.errors)));
        }

        let data = result.data.unwrap_or(Value::Null);
        // Pushed entities refresh any watched query that reads them
        self.client.cache.write(&self.document, &data);
        self.client.queries.broadcast(&self.client.cache);
        Some(Ok(data))
    }

    /// Cancel the subscription. Calling this more than once has no further
    /// effect.
    pub fn unsubscribe(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        drop(stream);

        self.client.active_subscriptions.fetch_sub(1, Ordering::Relaxed);
        self.client.record_finish(self.id, RecordOutcome::Unsubscribed);
        debug!(subscription = %self.id, "Subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
