//! Transport abstraction between the client and an executor

use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::debug;

use super::error::ClientError;
use super::schema::Schema;
use super::types::{ExecutionResult, Operation};

/// Stream of subscription results
pub type EventStream = Pin<Box<dyn Stream<Item = ExecutionResult> + Send>>;

/// Carries operations to whatever executes them
#[async_trait]
pub trait Link: Send + Sync {
    /// Execute a query or mutation
    async fn execute(&self, operation: Operation) -> ExecutionResult;

    /// Open a subscription stream
    fn subscribe(&self, operation: Operation) -> Result<EventStream, ClientError>;
}

/// Link that executes operations directly against an in-process schema
#[derive(Clone)]
pub struct SchemaLink {
    schema: Arc<Schema>,
}

impl SchemaLink {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Link for SchemaLink {
    async fn execute(&self, operation: Operation) -> ExecutionResult {
        debug!(
            id = %operation.id,
            kind = %operation.document.kind,
            field = %operation.document.field,
            "Executing operation against schema"
        );
        self.schema.execute(&operation).await
    }

    fn subscribe(&self, operation: Operation) -> Result<EventStream, ClientError> {
        debug!(
            id = %operation.id,
            field = %operation.document.field,
            "Opening subscription against schema"
        );
        self.schema.subscribe(operation)
    }
}
