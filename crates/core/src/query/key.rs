//! Cache keys.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Identity of one cached task: a base path followed by zero or more segments.
///
/// Mirrors the `[path, params]` keys emitted for generated query hooks.
/// Parameter segments are stored as canonical JSON (object keys sorted), so
/// two params values that serialize to the same object share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// A key with a single base segment, e.g. `"/items"`.
    pub fn new(base: impl Into<String>) -> Self {
        Self(vec![base.into()])
    }

    /// Append a plain segment (an entity id, a sub-resource name, ...).
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Append request parameters as a canonical JSON segment.
    ///
    /// Parameters serializing to `null` add no segment.
    pub fn with_params<P: Serialize + ?Sized>(self, params: &P) -> Self {
        match serde_json::to_value(params) {
            Ok(Value::Null) => self,
            Ok(value) => self.segment(canonicalize(value).to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "Query params are not serializable; key uses base only.");
                self
            }
        }
    }

    /// Key segments, base first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `prefix` matches this key segment by segment.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment:?}")?;
        }
        f.write_str("]")
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        leaf => leaf,
    }
}
