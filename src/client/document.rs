//! Minimal GraphQL document parsing
//!
//! Supports a single operation with a single root field and an optional flat
//! selection set, which is all the mock schema needs:
//!
//! ```text
//! mutation updateUser { updateUser { id name } }
//! subscription { userUpdated { id } }
//! { user { id name } }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Operation type of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("unexpected end of document")]
    UnexpectedEnd,

    #[error("unexpected token '{found}', expected {expected}")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("document has trailing content after the operation: '{0}'")]
    TrailingContent(String),
}

/// Parsed operation document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub kind: OperationKind,
    /// Operation name, if given
    pub name: Option<String>,
    /// Root field
    pub field: String,
    /// Selected sub-fields; empty for scalar roots
    pub selection: Vec<String>,
}

impl Document {
    /// Parse a document from source text
    pub fn parse(source: &str) -> Result<Self, DocumentError> {
        let tokens = tokenize(source);
        let mut cursor = tokens.iter().map(String::as_str).peekable();

        let kind = match cursor.peek().copied() {
            Some("{") => OperationKind::Query,
            Some("query") => {
                cursor.next();
                OperationKind::Query
            }
            Some("mutation") => {
                cursor.next();
                OperationKind::Mutation
            }
            Some("subscription") => {
                cursor.next();
                OperationKind::Subscription
            }
            Some(other) => {
                return Err(DocumentError::UnexpectedToken {
                    found: other.to_string(),
                    expected: "operation type or '{'",
                })
            }
            None => return Err(DocumentError::UnexpectedEnd),
        };

        let name = match cursor.peek().copied() {
            Some("{") => None,
            Some(ident) if is_name(ident) => {
                cursor.next();
                Some(ident.to_string())
            }
            Some(other) => {
                return Err(DocumentError::UnexpectedToken {
                    found: other.to_string(),
                    expected: "operation name or '{'",
                })
            }
            None => return Err(DocumentError::UnexpectedEnd),
        };

        expect(&mut cursor, "{")?;
        let field = expect_name(&mut cursor)?;

        let mut selection = Vec::new();
        if cursor.peek().copied() == Some("{") {
            cursor.next();
            loop {
                match cursor.next() {
                    Some("}") => break,
                    Some(ident) if is_name(ident) => selection.push(ident.to_string()),
                    Some(other) => {
                        return Err(DocumentError::UnexpectedToken {
                            found: other.to_string(),
                            expected: "field name or '}'",
                        })
                    }
                    None => return Err(DocumentError::UnexpectedEnd),
                }
            }
        }

        expect(&mut cursor, "}")?;

        let rest: Vec<&str> = cursor.collect();
        if !rest.is_empty() {
            return Err(DocumentError::TrailingContent(rest.join(" ")));
        }

        Ok(Self {
            kind,
            name,
            field,
            selection,
        })
    }

    /// Operation name, falling back to the root field
    pub fn operation_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.field)
    }
}

fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in source.chars() {
        match ch {
            '{' | '}' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            }
            c if c.is_whitespace() || c == ',' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn is_name(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

fn expect<'a>(
    cursor: &mut impl Iterator<Item = &'a str>,
    token: &'static str,
) -> Result<(), DocumentError> {
    match cursor.next() {
        Some(found) if found == token => Ok(()),
        Some(found) => Err(DocumentError::UnexpectedToken {
            found: found.to_string(),
            expected: token,
        }),
        None => Err(DocumentError::UnexpectedEnd),
    }
}

fn expect_name<'a>(cursor: &mut impl Iterator<Item = &'a str>) -> Result<String, DocumentError> {
    match cursor.next() {
        Some(found) if is_name(found) => Ok(found.to_string()),
        Some(found) => Err(DocumentError::UnexpectedToken {
            found: found.to_string(),
            expected: "field name",
        }),
        None => Err(DocumentError::UnexpectedEnd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_mutation() {
        let doc = Document::parse("mutation updateUser { updateUser { id name }}").unwrap();
        assert_eq!(doc.kind, OperationKind::Mutation);
        assert_eq!(doc.name.as_deref(), Some("updateUser"));
        assert_eq!(doc.field, "updateUser");
        assert_eq!(doc.selection, vec!["id", "name"]);
    }

    #[test]
    fn test_parse_shorthand_query() {
        let doc = Document::parse("{ foo }").unwrap();
        assert_eq!(doc.kind, OperationKind::Query);
        assert_eq!(doc.name, None);
        assert_eq!(doc.operation_name(), "foo");
        assert!(doc.selection.is_empty());
    }

    #[test]
    fn test_parse_anonymous_subscription() {
        let doc = Document::parse("subscription {\n  userUpdated {\n    id,\n    name\n  }\n}").unwrap();
        assert_eq!(doc.kind, OperationKind::Subscription);
        assert_eq!(doc.field, "userUpdated");
        assert_eq!(doc.selection.len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Document::parse(""), Err(DocumentError::UnexpectedEnd));
        assert_eq!(
            Document::parse("mutation { updateUser { id }"),
            Err(DocumentError::UnexpectedEnd)
        );
        assert!(matches!(
            Document::parse("fragment X on User { id }"),
            Err(DocumentError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            Document::parse("{ foo } { bar }"),
            Err(DocumentError::TrailingContent(_))
        ));
    }
}
