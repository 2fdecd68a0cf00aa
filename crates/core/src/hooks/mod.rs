//! Query factories built on [`QueryClient`](crate::query::QueryClient).
//!
//! [`EntityQuery`] loads one resource by identifier. [`MultiSourceQuery`]
//! fans a list request out over several data sources and folds the results
//! into one [`AggregatedResult`]. [`run_mutation`] invalidates cached reads
//! after a successful write.

mod entity;
mod multi_source;
mod mutation;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub use entity::{EntityQuery, EntityQueryConfig, EntityResult, Extraction, IdValidator, Refetch};
pub use multi_source::{AggregateOptions, AggregatedResult, MultiSourceQuery, MultiSourceQueryBuilder};
pub use mutation::run_mutation;

/// Opaque identifier of one data source (an account profile, a tenant, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceDescriptor(String);

impl SourceDescriptor {
    /// Wrap a source identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceDescriptor {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceDescriptor {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request parameters that can be layered.
pub trait MergeParams: Clone {
    /// Combine `self` with `overlay`; fields present in `overlay` win.
    fn merge(&self, overlay: &Self) -> Self;
}

impl MergeParams for () {
    fn merge(&self, _overlay: &Self) -> Self {}
}

/// Shallow object merge. A `null` overlay keeps the base; any other
/// non-object overlay replaces it.
impl MergeParams for Value {
    fn merge(&self, overlay: &Self) -> Self {
        match (self, overlay) {
            (Value::Object(base), Value::Object(fields)) => {
                let mut merged = base.clone();
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            (_, Value::Null) => self.clone(),
            _ => overlay.clone(),
        }
    }
}
