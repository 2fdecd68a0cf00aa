//! Error types shared across the core.

use thiserror::Error;

/// The schema document does not have the node shapes the normalizer expects.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A `required` list contains something other than a property name.
    #[error("`required` at {path} must only contain strings, found {found}")]
    InvalidRequiredEntry {
        /// JSON pointer of the offending entry.
        path: String,
        /// JSON type name of the offending entry.
        found: &'static str,
    },

    /// Two property names collapse onto the same camelCase name.
    #[error("properties at {path} contain more than one name normalizing to `{name}`")]
    PropertyCollision {
        /// JSON pointer of the `properties` object.
        path: String,
        /// The camelCase name both properties map to.
        name: String,
    },

    /// Reading or writing a schema file failed.
    #[error("failed to access schema file: {0}")]
    Io(#[from] std::io::Error),

    /// The schema file is not valid JSON.
    #[error("failed to parse schema document: {0}")]
    Json(#[from] serde_json::Error),
}

/// A request task failed before producing a response envelope.
///
/// Cloneable so a single failure can be stored in the query cache and handed
/// to every awaiter of a shared in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The transport layer failed (connection, TLS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded into the declared payload.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The response status is not declared for this operation.
    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),

    /// The task was cancelled before it settled.
    #[error("request cancelled")]
    Cancelled,

    /// The cache held a value of a different type for this key.
    #[error("internal error: {0}")]
    Internal(String),
}
