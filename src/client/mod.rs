//! In-process GraphQL client
//!
//! The subject the harness checks for context retention. It offers:
//! - One-shot queries and mutations
//! - Watched queries backed by a normalized cache
//! - Push subscriptions over a link's event stream
//! - An optional dev-tools history
//!
//! Every call accepts an opaque [`Context`] that travels with the operation
//! down to the resolvers.

pub mod cache;
pub mod devtools;
pub mod document;
pub mod error;
pub mod link;
pub mod observable;
mod query_manager;
pub mod schema;
pub mod types;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use cache::InMemoryCache;
pub use devtools::{DevTools, OperationRecord, RecordOutcome};
pub use document::{Document, DocumentError, OperationKind};
pub use error::ClientError;
pub use link::{EventStream, Link, SchemaLink};
pub use observable::{ObservableQuery, QuerySubscription, Subscription};
pub use schema::{FieldResolver, PubSub, ResolveInfo, Schema};
pub use types::{
    Context, ExecutionResult, FetchPolicy, GraphQLError, Operation, OperationId, QueryResult,
    ResultSource, Variables,
};

use query_manager::QueryManager;

/// Deployment environment the client is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

/// Construction-time client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Environment the client runs in; production turns dev tools off by default
    pub environment: Environment,

    /// Explicit dev-tools switch; `None` follows the environment
    pub connect_to_dev_tools: Option<bool>,

    /// Maximum number of operations kept in the dev-tools history
    pub dev_tools_history: usize,

    /// Keep contexts of torn-down watched queries (reproduces the known leak)
    pub retain_watched_contexts: bool,

    /// Fetch policy for watched queries without an explicit one
    pub default_fetch_policy: FetchPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            connect_to_dev_tools: None,
            dev_tools_history: 100,
            retain_watched_contexts: false,
            default_fetch_policy: FetchPolicy::CacheFirst,
        }
    }
}

impl ClientOptions {
    pub fn dev_tools_enabled(&self) -> bool {
        self.connect_to_dev_tools
            .unwrap_or(self.environment != Environment::Production)
    }
}

/// A document plus the per-call arguments
#[derive(Clone)]
pub struct Request {
    pub document: Arc<Document>,
    pub variables: Variables,
    pub context: Option<Context>,
    pub fetch_policy: Option<FetchPolicy>,
}

impl Request {
    /// Parse a document into a request
    pub fn new(source: &str) -> Result<Self, ClientError> {
        Ok(Self {
            document: Arc::new(Document::parse(source)?),
            variables: Variables::new(),
            context: None,
            fetch_policy: None,
        })
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    fn expect_kind(&self, expected: OperationKind) -> Result<(), ClientError> {
        if self.document.kind != expected {
            return Err(ClientError::WrongOperationKind {
                expected,
                found: self.document.kind,
            });
        }
        Ok(())
    }
}

/// Retention counters reported in diagnostic snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    pub watched_queries: usize,
    pub query_observers: usize,
    pub retained_contexts: usize,
    pub active_subscriptions: usize,
    pub devtools_records: usize,
    pub cache_records: usize,
}

pub(crate) struct ClientInner {
    pub(crate) link: Arc<dyn Link>,
    pub(crate) cache: InMemoryCache,
    pub(crate) queries: QueryManager,
    pub(crate) devtools: Option<DevTools>,
    pub(crate) options: ClientOptions,
    next_id: AtomicU64,
    pub(crate) active_subscriptions: AtomicUsize,
}

impl ClientInner {
    pub(crate) fn operation(&self, id: OperationId, request: &Request) -> Operation {
        Operation {
            id,
            document: request.document.clone(),
            variables: request.variables.clone(),
            context: request.context.clone(),
        }
    }

    pub(crate) fn next_id(&self) -> OperationId {
        OperationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn record_start(&self, operation: &Operation) {
        if let Some(devtools) = &self.devtools {
            devtools.record_start(operation);
        }
    }

    pub(crate) fn record_finish(&self, id: OperationId, outcome: RecordOutcome) {
        if let Some(devtools) = &self.devtools {
            devtools.record_finish(id, outcome);
        }
    }

    /// Execute over the link, write the cache and notify watchers
    pub(crate) async fn execute(&self, operation: Operation) -> Result<Value, ClientError> {
        let id = operation.id;
        let document = operation.document.clone();
        self.record_start(&operation);

        let result = self.link.execute(operation).await;

        if !result.is_ok() {
            let error = ClientError::GraphQL(result.errors);
            self.record_finish(
                id,
                RecordOutcome::Failed {
                    error: error.to_string(),
                },
            );
            return Err(error);
        }

        let data = result.data.unwrap_or(Value::Null);
        self.cache.write(&document, &data);
        self.queries.broadcast(&self.cache);
        self.record_finish(id, RecordOutcome::Succeeded);
        Ok(data)
    }
}

/// GraphQL client handle; cheap to clone
#[derive(Clone)]
pub struct GraphQLClient {
    inner: Arc<ClientInner>,
}

impl GraphQLClient {
    pub fn new(link: Arc<dyn Link>, options: ClientOptions) -> Self {
        let devtools = options
            .dev_tools_enabled()
            .then(|| DevTools::new(options.dev_tools_history));

        info!(
            environment = ?options.environment,
            dev_tools = devtools.is_some(),
            retain_watched_contexts = options.retain_watched_contexts,
            "Creating GraphQL client"
        );

        Self {
            inner: Arc::new(ClientInner {
                link,
                cache: InMemoryCache::new(),
                queries: QueryManager::new(options.retain_watched_contexts),
                devtools,
                options,
                next_id: AtomicU64::new(1),
                active_subscriptions: AtomicUsize::new(0),
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn cache(&self) -> &InMemoryCache {
        &self.inner.cache
    }

    pub fn devtools(&self) -> Option<&DevTools> {
        self.inner.devtools.as_ref()
    }

    /// Run a one-shot query
    pub async fn query(&self, request: Request) -> Result<Value, ClientError> {
        request.expect_kind(OperationKind::Query)?;

        let policy = request
            .fetch_policy
            .unwrap_or(self.inner.options.default_fetch_policy);
        if policy == FetchPolicy::CacheFirst {
            if let Some(data) = self.inner.cache.read(&request.document) {
                debug!(field = %request.document.field, "Query served from cache");
                return Ok(data);
            }
        }

        let id = self.inner.next_id();
        let operation = self.inner.operation(id, &request);
        drop(request);
        self.inner.execute(operation).await
    }

    /// Run a mutation; errors from the resolver surface as `ClientError::GraphQL`
    pub async fn mutate(&self, request: Request) -> Result<Value, ClientError> {
        request.expect_kind(OperationKind::Mutation)?;

        let id = self.inner.next_id();
        let operation = self.inner.operation(id, &request);
        drop(request);

        let result = self.inner.execute(operation).await;
        if let Err(e) = &result {
            debug!(operation = %id, "Mutation failed: {}", e);
        }
        result
    }

    /// Create a watched query; nothing is fetched until it is subscribed
    pub fn watch_query(&self, request: Request) -> Result<ObservableQuery, ClientError> {
        request.expect_kind(OperationKind::Query)?;
        let id = self.inner.next_id();
        Ok(ObservableQuery::new(self.inner.clone(), id, request))
    }

    /// Open a push subscription
    pub fn subscribe(&self, request: Request) -> Result<Subscription, ClientError> {
        request.expect_kind(OperationKind::Subscription)?;

        let id = self.inner.next_id();
        let operation = self.inner.operation(id, &request);
        let document = request.document.clone();
        drop(request);

        self.inner.record_start(&operation);
        let stream = match self.inner.link.subscribe(operation) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(operation = %id, "Subscription rejected: {}", e);
                self.inner.record_finish(
                    id,
                    RecordOutcome::Failed {
                        error: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        self.inner.active_subscriptions.fetch_add(1, Ordering::Relaxed);
        Ok(Subscription::new(self.inner.clone(), id, document, stream))
    }

    /// Current retention counters
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            watched_queries: self.inner.queries.watched_count(),
            query_observers: self.inner.queries.observer_count(),
            retained_contexts: self.inner.queries.retained_count(),
            active_subscriptions: self.inner.active_subscriptions.load(Ordering::Relaxed),
            devtools_records: self.inner.devtools.as_ref().map(DevTools::len).unwrap_or(0),
            cache_records: self.inner.cache.len(),
        }
    }
}
