//! Error types for the value model and the captured object graph.

use thiserror::Error;

/// Errors raised by graph access and type classification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Node not found: {0}")]
    NodeNotFound(u32),

    #[error("Node {0} is not a collection")]
    NotACollection(u32),

    #[error("Node {0} is not an object")]
    NotAnObject(u32),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown property {property} on type {type_name}")]
    UnknownProperty { type_name: String, property: String },

    #[error("Incompatible value: expected {expected}, found {found}")]
    IncompatibleValue { expected: String, found: String },

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
