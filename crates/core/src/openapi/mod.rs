//! OpenAPI schema pre-processing.
//!
//! Runs before client code generation. The pipeline is:
//! 1. Read: schema file -> `serde_json::Value` (key order preserved)
//! 2. Normalize: snake_case property names -> camelCase (see [`keys`])
//! 3. Write: pretty-printed JSON for the downstream generator

mod keys;

use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::SchemaError;

pub use keys::{
    NormalizeReport, is_snake, normalize_schema_keys, normalize_with_report, to_camel_case,
};

/// Read a schema document from disk.
pub fn read_schema(path: &Path) -> Result<Value, SchemaError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Render a schema document the way [`write_schema`] stores it.
pub fn render_schema(schema: &Value) -> Result<String, SchemaError> {
    let mut rendered = serde_json::to_string_pretty(schema)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write a schema document to disk, creating parent directories as needed.
pub fn write_schema(path: &Path, schema: &Value) -> Result<(), SchemaError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_schema(schema)?)?;
    Ok(())
}

/// Normalize the schema at `input` and write the result to `output`.
///
/// `input` and `output` may be the same file.
pub fn normalize_schema_file(input: &Path, output: &Path) -> Result<NormalizeReport, SchemaError> {
    let schema = read_schema(input)?;
    debug!(input = %input.display(), "Read schema document.");

    let (normalized, report) = normalize_with_report(&schema)?;
    debug!(
        renamed_properties = report.renamed_properties,
        renamed_required = report.renamed_required,
        "Normalized schema property names."
    );

    write_schema(output, &normalized)?;
    debug!(output = %output.display(), "Normalized schema written.");

    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const TEST_OPENAPI_JSON: &str = r##"{
  "openapi": "3.1.0",
  "info": { "title": "Profiles API", "version": "1.0.0" },
  "paths": {
    "/profiles/{profile_id}/items": {
      "get": {
        "operationId": "listItems",
        "parameters": [
          { "name": "profile_id", "in": "path", "required": true, "schema": { "type": "string" } },
          { "name": "page_size", "in": "query", "required": false, "schema": { "type": "integer" } }
        ],
        "responses": {
          "200": { "description": "OK", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/PaginatedItems" } } } }
        }
      }
    }
  },
  "components": {
    "schemas": {
      "PaginatedItems": {
        "type": "object",
        "properties": {
          "items": { "type": "array", "items": { "$ref": "#/components/schemas/Item" } },
          "total_count": { "type": "integer" }
        },
        "required": ["items", "total_count"]
      },
      "Item": {
        "type": "object",
        "properties": {
          "item_id": { "type": "string" },
          "created_at": { "type": "string", "format": "date-time" }
        },
        "required": ["item_id"]
      }
    }
  }
}"##;

    #[test]
    fn test_normalize_schema_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let input = dir.path().join("openapi.json");
        let output = dir.path().join("generated").join("openapi.json");
        fs::write(&input, TEST_OPENAPI_JSON).unwrap();

        let report = normalize_schema_file(&input, &output).unwrap();
        assert_eq!(report.renamed_properties, 3);
        assert_eq!(report.renamed_required, 2);

        let written = read_schema(&output).unwrap();
        let paginated = &written["components"]["schemas"]["PaginatedItems"];
        assert!(paginated["properties"].get("totalCount").is_some());
        assert_eq!(paginated["required"], json!(["items", "totalCount"]));

        // Parameter names and paths are not schema properties.
        let params = &written["paths"]["/profiles/{profile_id}/items"]["get"]["parameters"];
        assert_eq!(params[0]["name"], "profile_id");
        assert_eq!(params[1]["required"], false);
    }

    #[test]
    fn test_normalize_schema_file_in_place_is_stable() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("openapi.json");
        fs::write(&path, TEST_OPENAPI_JSON).unwrap();

        normalize_schema_file(&path, &path).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let report = normalize_schema_file(&path, &path).unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(report.total(), 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let input = dir.path().join("broken.json");
        fs::write(&input, "{ not json").unwrap();

        let err = normalize_schema_file(&input, &dir.path().join("out.json")).unwrap_err();
        assert!(matches!(err, SchemaError::Json(_)));
        assert!(!dir.path().join("out.json").exists());
    }

    #[test]
    fn test_missing_input_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let err = read_schema(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SchemaError::Io(_)));
    }
}
