//! Property-name normalization for OpenAPI schema documents.
//!
//! Rewrites snake_case names to camelCase in exactly two places:
//! - the keys of every `properties` object
//! - the string entries of every `required` list
//!
//! Every other key is copied verbatim, so containers such as
//! `patternProperties` keep their own names while the schemas nested inside
//! them are still normalized.

use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Keys the normalizer treats specially. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaKey {
    Properties,
    Required,
    Other,
}

impl SchemaKey {
    fn classify(key: &str) -> Self {
        match key {
            "properties" => SchemaKey::Properties,
            "required" => SchemaKey::Required,
            _ => SchemaKey::Other,
        }
    }
}

/// Counts of names rewritten by one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Property names renamed under `properties`.
    pub renamed_properties: usize,
    /// Entries renamed inside `required` lists.
    pub renamed_required: usize,
}

impl NormalizeReport {
    /// Total number of rewritten names.
    pub fn total(&self) -> usize {
        self.renamed_properties + self.renamed_required
    }
}

/// Check whether a name is snake_case: it contains an underscore and no
/// uppercase characters.
pub fn is_snake(name: &str) -> bool {
    name.contains('_') && !name.chars().any(char::is_uppercase)
}

/// Convert a snake_case name to camelCase.
///
/// Underscores are dropped and a lowercase ASCII letter directly after an
/// underscore is upper-cased (`account_id` -> `accountId`, `user_1` -> `user1`).
pub fn to_camel_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
            continue;
        }
        if upper_next && c.is_ascii_lowercase() {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push(c);
        }
        upper_next = false;
    }
    result
}

/// Normalize a schema document, returning a fresh tree.
///
/// The input is never modified. Running the function on its own output is a
/// no-op. Apart from a non-string `required` entry, the only failure is two
/// property names of one object mapping to the same camelCase name.
pub fn normalize_schema_keys(schema: &Value) -> Result<Value, SchemaError> {
    normalize_with_report(schema).map(|(document, _)| document)
}

/// Normalize a schema document and report how many names were rewritten.
pub fn normalize_with_report(schema: &Value) -> Result<(Value, NormalizeReport), SchemaError> {
    let mut report = NormalizeReport::default();
    let document = normalize_node(schema, "", &mut report)?;
    Ok((document, report))
}

fn normalize_node(
    node: &Value,
    path: &str,
    report: &mut NormalizeReport,
) -> Result<Value, SchemaError> {
    match node {
        Value::Object(map) => normalize_object(map, path, report).map(Value::Object),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                out.push(normalize_node(
                    item,
                    &child_path(path, &index.to_string()),
                    report,
                )?);
            }
            Ok(Value::Array(out))
        }
        leaf => Ok(leaf.clone()),
    }
}

fn normalize_object(
    map: &Map<String, Value>,
    path: &str,
    report: &mut NormalizeReport,
) -> Result<Map<String, Value>, SchemaError> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let child = child_path(path, key);
        let normalized = match (SchemaKey::classify(key), value) {
            (SchemaKey::Properties, Value::Object(properties)) => {
                Value::Object(normalize_properties(properties, &child, report)?)
            }
            (SchemaKey::Required, Value::Array(names)) => {
                Value::Array(normalize_required(names, &child, report)?)
            }
            // `required: true` on parameters, `properties` given as a list, ...
            _ => normalize_node(value, &child, report)?,
        };
        out.insert(key.clone(), normalized);
    }
    Ok(out)
}

fn normalize_properties(
    properties: &Map<String, Value>,
    path: &str,
    report: &mut NormalizeReport,
) -> Result<Map<String, Value>, SchemaError> {
    let mut out = Map::with_capacity(properties.len());
    for (name, schema) in properties {
        let child = child_path(path, name);
        let renamed = if is_snake(name) {
            report.renamed_properties += 1;
            to_camel_case(name)
        } else {
            name.clone()
        };

        if out.contains_key(&renamed) {
            return Err(SchemaError::PropertyCollision {
                path: display_path(path),
                name: renamed,
            });
        }

        let normalized = normalize_node(schema, &child, report)?;
        out.insert(renamed, normalized);
    }
    Ok(out)
}

fn normalize_required(
    names: &[Value],
    path: &str,
    report: &mut NormalizeReport,
) -> Result<Vec<Value>, SchemaError> {
    names
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::String(name) if is_snake(name) => {
                report.renamed_required += 1;
                Ok(Value::String(to_camel_case(name)))
            }
            Value::String(name) => Ok(Value::String(name.clone())),
            other => Err(SchemaError::InvalidRequiredEntry {
                path: display_path(&child_path(path, &index.to_string())),
                found: json_type_name(other),
            }),
        })
        .collect()
}

/// Append a segment to a JSON pointer, escaping `~` and `/`.
fn child_path(path: &str, segment: &str) -> String {
    format!("{path}/{}", segment.replace('~', "~0").replace('/', "~1"))
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
