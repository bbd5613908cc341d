use thiserror::Error;

use super::document::{DocumentError, OperationKind};
use super::types::GraphQLError;

/// Errors surfaced by the client to its callers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Execution produced errors
    #[error("GraphQL error: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    /// Document could not be parsed
    #[error("Invalid document: {0}")]
    Document(#[from] DocumentError),

    /// Document type does not match the client method
    #[error("Expected a {expected} document, got {found}")]
    WrongOperationKind {
        expected: OperationKind,
        found: OperationKind,
    },

    /// No subscription field with this name
    #[error("Unknown subscription field: {0}")]
    UnknownSubscription(String),
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
