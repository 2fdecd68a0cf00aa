use clap::Args;
use meridian_core::openapi::normalize_schema_file;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{load_config, run_command};

#[derive(Args, Debug, Clone)]
pub struct NormalizeArgs {
    /// Schema document to read. Defaults to `[openapi] input` in meridian.toml
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Where to write the normalized document. Defaults to `[openapi] output`
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Project configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

pub fn run(args: NormalizeArgs) -> i32 {
    run_command(|| run_inner(args))
}

fn run_inner(args: NormalizeArgs) -> Result<(), String> {
    let (config, root) = load_config(args.config.as_deref())?;
    let (default_input, default_output) = config.resolve_paths(&root);
    let input = args.input.unwrap_or(default_input);
    let output = args.output.unwrap_or(default_output);

    normalize(&input, &output)?;
    // Generator pre-step protocol: a single line on stdout
    println!("normalized");
    Ok(())
}

fn normalize(input: &Path, output: &Path) -> Result<(), String> {
    let report = normalize_schema_file(input, output)
        .map_err(|e| format!("Failed to normalize {}: {e}", input.display()))?;
    info!(
        input = %input.display(),
        output = %output.display(),
        renamed = report.total(),
        "Schema normalized."
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_with_config_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("meridian.toml"),
            "[openapi]\ninput = \"schema/api.json\"\noutput = \"generated/api.json\"\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("schema")).unwrap();
        fs::write(
            dir.path().join("schema/api.json"),
            json!({
                "components": { "schemas": { "Profile": {
                    "properties": { "display_name": { "type": "string" } },
                    "required": ["display_name"]
                }}}
            })
            .to_string(),
        )
        .unwrap();

        let code = run(NormalizeArgs {
            input: None,
            output: None,
            config: Some(dir.path().join("meridian.toml")),
        });
        assert_eq!(code, 0);

        let written: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("generated/api.json")).unwrap())
                .unwrap();
        let profile = &written["components"]["schemas"]["Profile"];
        assert!(profile["properties"].get("displayName").is_some());
        assert_eq!(profile["required"], json!(["displayName"]));
    }

    #[test]
    fn test_missing_input_fails() {
        let dir = TempDir::new().unwrap();
        let code = run(NormalizeArgs {
            input: Some(dir.path().join("absent.json")),
            output: Some(dir.path().join("out.json")),
            config: Some(dir.path().join("meridian.toml")),
        });
        assert_eq!(code, 1);
        assert!(!dir.path().join("out.json").exists());
    }
}
