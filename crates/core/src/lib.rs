//! Meridian core: the data-access layer between a schema-derived HTTP client
//! and application views.
//!
//! - [`openapi`] rewrites snake_case property names of a schema document to
//!   camelCase before client generation.
//! - [`envelope`] narrows status-tagged responses to their success payload.
//! - [`query`] is the in-process cache that runs and de-duplicates request
//!   tasks.
//! - [`hooks`] builds entity and multi-source list queries on top of it.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod hooks;
pub mod openapi;
pub mod query;

pub use envelope::{Envelope, Narrowed, ResponseEnvelope};
pub use error::{RequestError, SchemaError};
pub use hooks::{
    AggregateOptions, AggregatedResult, EntityQuery, EntityQueryConfig, EntityResult, Extraction,
    MultiSourceQuery, SourceDescriptor, run_mutation,
};
pub use query::{QueryClient, QueryKey, QueryState, QueryStatus};
