//! Per-scenario fixtures: mock schema, pub/sub hub and client

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::client::{ClientOptions, GraphQLClient, PubSub, ResolveInfo, Schema, SchemaLink};

/// Watched query used by the query scenarios
pub const USER_QUERY: &str = "query user { user { id name } }";

/// Mutation whose resolver always fails
pub const UPDATE_USER_MUTATION: &str = "mutation updateUser { updateUser { id name } }";

/// Push subscription fed by [`USER_UPDATED_TOPIC`]
pub const USER_UPDATED_SUBSCRIPTION: &str = "subscription userUpdated { userUpdated { id name } }";

pub const USER_UPDATED_TOPIC: &str = "USER_UPDATED";

/// Build the mock schema:
///
/// ```text
/// type Query        { foo: String  user: User }
/// type Mutation     { updateUser: User! }
/// type Subscription { userUpdated: User }
/// type User         { id: ID!  name: String }
/// ```
pub fn mock_schema(pubsub: PubSub) -> Schema {
    Schema::builder(pubsub)
        .query("foo", "String", |_: &ResolveInfo| -> Result<Value, String> {
            Ok(Value::Null)
        })
        .query("user", "User", |_: &ResolveInfo| -> Result<Value, String> {
            Ok(json!({ "id": 1, "name": "Dotan" }))
        })
        .mutation("updateUser", "User", |_: &ResolveInfo| -> Result<Value, String> {
            Err("updateUser is not allowed".to_string())
        })
        .subscription("userUpdated", "User", USER_UPDATED_TOPIC)
        .build()
}

/// Everything a scenario talks to, rebuilt from scratch each time
pub struct Fixture {
    pub pubsub: PubSub,
    pub schema: Arc<Schema>,
    pub client: GraphQLClient,
}

impl Fixture {
    pub fn new(options: ClientOptions) -> Self {
        let pubsub = PubSub::default();
        let schema = Arc::new(mock_schema(pubsub.clone()));
        let link = Arc::new(SchemaLink::new(schema.clone()));
        let client = GraphQLClient::new(link, options);

        Self {
            pubsub,
            schema,
            client,
        }
    }

    /// Publish one `userUpdated` event after `delay`, from a separate task
    pub fn schedule_publish(&self, delay: Duration) -> tokio::task::JoinHandle<usize> {
        let pubsub = self.pubsub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let reached = pubsub.publish(
                USER_UPDATED_TOPIC,
                json!({ "id": 1, "name": "Dotan (updated)" }),
            );
            debug!(reached, "Published userUpdated event");
            reached
        })
    }
}
