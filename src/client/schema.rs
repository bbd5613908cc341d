//! Executable schema and in-process pub/sub
//!
//! A schema maps `(operation kind, root field)` to a resolver. Subscription
//! fields map to a pub/sub topic; every published payload on that topic is
//! delivered to each open subscription stream.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::document::{Document, OperationKind};
use super::error::ClientError;
use super::link::EventStream;
use super::types::{Context, ExecutionResult, GraphQLError, Operation, Variables};

/// Arguments handed to a resolver
#[derive(Clone)]
pub struct ResolveInfo {
    pub field: String,
    pub variables: Variables,
    pub context: Option<Context>,
}

/// Resolves one root field
#[async_trait]
pub trait FieldResolver: Send + Sync {
    async fn resolve(&self, info: &ResolveInfo) -> Result<Value, String>;
}

#[async_trait]
impl<F> FieldResolver for F
where
    F: Fn(&ResolveInfo) -> Result<Value, String> + Send + Sync,
{
    async fn resolve(&self, info: &ResolveInfo) -> Result<Value, String> {
        (self)(info)
    }
}

struct FieldDef {
    type_name: String,
    resolver: Arc<dyn FieldResolver>,
}

/// Message carried on the pub/sub channel
#[derive(Debug, Clone)]
pub struct Publication {
    pub topic: String,
    pub payload: Value,
}

/// In-process publish/subscribe hub feeding subscription fields
#[derive(Clone)]
pub struct PubSub {
    tx: broadcast::Sender<Publication>,
}

impl PubSub {
    /// Create new hub with channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a payload; returns the number of receivers reached
    pub fn publish(&self, topic: impl Into<String>, payload: Value) -> usize {
        let publication = Publication {
            topic: topic.into(),
            payload,
        };
        match self.tx.send(publication) {
            Ok(receivers) => receivers,
            Err(e) => {
                debug!("Publish to '{}' reached no subscribers", e.0.topic);
                0
            }
        }
    }

    /// Subscribe to all publications
    pub fn subscribe(&self) -> broadcast::Receiver<Publication> {
        self.tx.subscribe()
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Executable schema
pub struct Schema {
    fields: HashMap<(OperationKind, String), FieldDef>,
    topics: HashMap<String, (String, String)>,
    pubsub: PubSub,
}

impl Schema {
    pub fn builder(pubsub: PubSub) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                fields: HashMap::new(),
                topics: HashMap::new(),
                pubsub,
            },
        }
    }

    pub fn pubsub(&self) -> &PubSub {
        &self.pubsub
    }

    /// Execute a query or mutation
    pub async fn execute(&self, operation: &Operation) -> ExecutionResult {
        let document = &operation.document;
        let key = (document.kind, document.field.clone());

        let Some(def) = self.fields.get(&key) else {
            return ExecutionResult::error(
                GraphQLError::new(format!(
                    "Cannot query field \"{}\" on type \"{}\"",
                    document.field,
                    root_type_name(document.kind)
                ))
                .at(&document.field),
            );
        };

        let info = ResolveInfo {
            field: document.field.clone(),
            variables: operation.variables.clone(),
            context: operation.context.clone(),
        };

        match def.resolver.resolve(&info).await {
            Ok(value) => {
                let mut data = Map::new();
                data.insert(
                    document.field.clone(),
                    project(value, &document.selection, &def.type_name),
                );
                ExecutionResult::data(Value::Object(data))
            }
            Err(message) => {
                debug!(field = %document.field, "Resolver failed: {}", message);
                ExecutionResult::error(GraphQLError::new(message).at(&document.field))
            }
        }
    }

    /// Open an event stream for a subscription field
    pub fn subscribe(&self, operation: Operation) -> Result<EventStream, ClientError> {
        let document: Arc<Document> = operation.document.clone();
        let Some((topic, type_name)) = self.topics.get(&document.field).cloned() else {
            return Err(ClientError::UnknownSubscription(document.field.clone()));
        };

        let stream = BroadcastStream::new(self.pubsub.subscribe()).filter_map(move |message| {
            // The stream owns the operation, context included, until it is dropped
            let operation = &operation;
            match message {
                Ok(publication) if publication.topic == topic => {
                    let mut data = Map::new();
                    data.insert(
                        operation.document.field.clone(),
                        project(publication.payload, &operation.document.selection, &type_name),
                    );
                    Some(ExecutionResult::data(Value::Object(data)))
                }
                Ok(_) => None,
                Err(lagged) => {
                    warn!("Subscription stream lagged: {}", lagged);
                    None
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Incremental schema construction
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn query<R>(self, field: &str, type_name: &str, resolver: R) -> Self
    where
        R: FieldResolver + 'static,
    {
        self.field(OperationKind::Query, field, type_name, resolver)
    }

    pub fn mutation<R>(self, field: &str, type_name: &str, resolver: R) -> Self
    where
        R: FieldResolver + 'static,
    {
        self.field(OperationKind::Mutation, field, type_name, resolver)
    }

    /// Subscription field fed by publications on `topic`
    pub fn subscription(mut self, field: &str, type_name: &str, topic: &str) -> Self {
        self.schema
            .topics
            .insert(field.to_string(), (topic.to_string(), type_name.to_string()));
        self
    }

    fn field<R>(mut self, kind: OperationKind, field: &str, type_name: &str, resolver: R) -> Self
    where
        R: FieldResolver + 'static,
    {
        self.schema.fields.insert(
            (kind, field.to_string()),
            FieldDef {
                type_name: type_name.to_string(),
                resolver: Arc::new(resolver),
            },
        );
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

fn root_type_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Query => "Query",
        OperationKind::Mutation => "Mutation",
        OperationKind::Subscription => "Subscription",
    }
}

fn project(value: Value, selection: &[String], type_name: &str) -> Value {
    match value {
        Value::Object(mut object) => {
            let mut projected = if selection.is_empty() {
                object
            } else {
                selection
                    .iter()
                    .map(|field| (field.clone(), object.remove(field).unwrap_or(Value::Null)))
                    .collect()
            };
            projected.insert("__typename".to_string(), Value::String(type_name.to_string()));
            Value::Object(projected)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| project(item, selection, type_name))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::OperationId;
    use serde_json::json;

    fn operation(source: &str) -> Operation {
        Operation {
            id: OperationId(1),
            document: Arc::new(Document::parse(source).unwrap()),
            variables: Variables::new(),
            context: None,
        }
    }

    fn schema() -> Schema {
        Schema::builder(PubSub::default())
            .query("user", "User", |_: &ResolveInfo| -> Result<Value, String> {
                Ok(json!({ "id": 7, "name": "Ada", "email": "ada@example.com" }))
            })
            .mutation("updateUser", "User", |_: &ResolveInfo| -> Result<Value, String> {
                Err("nope".to_string())
            })
            .subscription("userUpdated", "User", "USER_UPDATED")
            .build()
    }

    #[tokio::test]
    async fn test_execute_projects_selection() {
        let result = schema().execute(&operation("{ user { id name } }")).await;
        assert_eq!(
            result.data,
            Some(json!({ "user": { "id": 7, "name": "Ada", "__typename": "User" } }))
        );
    }

    #[tokio::test]
    async fn test_execute_resolver_error() {
        let result = schema()
            .execute(&operation("mutation { updateUser { id } }"))
            .await;
        assert!(result.data.is_none());
        assert_eq!(result.errors, vec![GraphQLError::new("nope").at("updateUser")]);
    }

    #[tokio::test]
    async fn test_execute_unknown_field() {
        let result = schema().execute(&operation("{ missing }")).await;
        assert!(result.errors[0].message.contains("Cannot query field \"missing\""));
    }

    #[tokio::test]
    async fn test_subscription_filters_topics() {
        let schema = schema();
        let mut stream = schema
            .subscribe(operation("subscription { userUpdated { id } }"))
            .unwrap();

        assert_eq!(schema.pubsub().publish("OTHER", json!({ "id": 1 })), 1);
        assert_eq!(schema.pubsub().publish("USER_UPDATED", json!({ "id": 2 })), 1);

        let result = stream.next().await.unwrap();
        assert_eq!(
            result.data,
            Some(json!({ "userUpdated": { "id": 2, "__typename": "User" } }))
        );

        drop(stream);
        assert_eq!(schema.pubsub().subscriber_count(), 0);
    }

    #[test]
    fn test_unknown_subscription() {
        let result = schema().subscribe(operation("subscription { nothing }"));
        assert!(matches!(result, Err(ClientError::UnknownSubscription(f)) if f == "nothing"));
    }
}
