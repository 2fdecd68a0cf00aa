//! Shared configuration for Meridian.
//!
//! This crate contains the `meridian.toml` project configuration used by both
//! the `meridian` CLI and applications embedding `meridian-core`.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Project configuration filename
pub const CONFIG_FILENAME: &str = "meridian.toml";

/// Default schema document read by the normalizer
const DEFAULT_OPENAPI_INPUT: &str = "openapi.json";

/// Default normalized schema document handed to the code generator
const DEFAULT_OPENAPI_OUTPUT: &str = "openapi.normalized.json";

/// Default freshness window for list queries (30 seconds)
const DEFAULT_STALE_TIME_MS: u64 = 30_000;

/// Default freshness window for single-entity queries (60 seconds)
const DEFAULT_ENTITY_STALE_TIME_MS: u64 = 60_000;

/// Root of `meridian.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProjectConfig {
    /// Schema normalization paths.
    pub openapi: OpenapiConfig,
    /// Caller-side freshness hints for the query cache.
    pub query: QueryDefaults,
}

/// `[openapi]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct OpenapiConfig {
    /// Schema document produced by the backend.
    pub input: PathBuf,
    /// Normalized schema consumed by the client generator.
    pub output: PathBuf,
}

impl Default for OpenapiConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_OPENAPI_INPUT),
            output: PathBuf::from(DEFAULT_OPENAPI_OUTPUT),
        }
    }
}

/// `[query]` table.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct QueryDefaults {
    /// How long a settled list result is served without refetching.
    pub stale_time_ms: u64,
    /// How long a settled single-entity result is served without refetching.
    pub entity_stale_time_ms: u64,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
            entity_stale_time_ms: DEFAULT_ENTITY_STALE_TIME_MS,
        }
    }
}

impl QueryDefaults {
    /// Freshness window for list queries.
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    /// Freshness window for single-entity queries.
    pub fn entity_stale_time(&self) -> Duration {
        Duration::from_millis(self.entity_stale_time_ms)
    }
}

impl ProjectConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|err| format!("Failed to parse {CONFIG_FILENAME}: {err}"))
    }

    /// Resolve the configured paths against a project root.
    pub fn resolve_paths(&self, project_root: &Path) -> (PathBuf, PathBuf) {
        (
            project_root.join(&self.openapi.input),
            project_root.join(&self.openapi.output),
        )
    }
}

/// Get the config file path for a project root.
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_FILENAME)
}

/// Read `meridian.toml`, falling back to defaults when the file does not exist.
pub fn read_config(path: &Path) -> Result<ProjectConfig, String> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file found, using defaults.");
        return Ok(ProjectConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;

    let config = ProjectConfig::from_toml(&contents)?;
    debug!(path = %path.display(), ?config, "Loaded project config.");
    Ok(config)
}
