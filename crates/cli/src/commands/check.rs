use clap::Args;
use meridian_core::openapi::{normalize_with_report, read_schema, render_schema};
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{load_config, run_command};

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Schema document to check. Defaults to `[openapi] input` in meridian.toml
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Print a unified diff of the changes normalization would make
    #[arg(long)]
    pub diff: bool,

    /// Project configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

pub fn run(args: CheckArgs) -> i32 {
    run_command(|| run_inner(args))
}

fn run_inner(args: CheckArgs) -> Result<(), String> {
    let input = match args.input {
        Some(input) => input,
        None => {
            let (config, root) = load_config(args.config.as_deref())?;
            config.resolve_paths(&root).0
        }
    };

    let outcome = check(&input)?;
    if outcome.pending == 0 {
        println!("\x1b[32m✓\x1b[0m {} is normalized", input.display());
        return Ok(());
    }

    if args.diff {
        print!("{}", outcome.diff);
    }
    Err(format!(
        "{} has {} snake_case name(s) to normalize; run `meridian normalize`",
        input.display(),
        outcome.pending
    ))
}

struct CheckOutcome {
    pending: usize,
    diff: String,
}

fn check(input: &Path) -> Result<CheckOutcome, String> {
    let schema =
        read_schema(input).map_err(|e| format!("Failed to read {}: {e}", input.display()))?;
    let (normalized, report) = normalize_with_report(&schema)
        .map_err(|e| format!("Failed to normalize {}: {e}", input.display()))?;
    debug!(
        renamed_properties = report.renamed_properties,
        renamed_required = report.renamed_required,
        "Checked schema."
    );

    let diff = if report.total() == 0 {
        String::new()
    } else {
        let current = render_schema(&schema).map_err(|e| e.to_string())?;
        let proposed = render_schema(&normalized).map_err(|e| e.to_string())?;
        unified_diff(&input.display().to_string(), &current, &proposed)
    };

    Ok(CheckOutcome {
        pending: report.total(),
        diff,
    })
}

fn unified_diff(label: &str, current: &str, proposed: &str) -> String {
    let diff = TextDiff::from_lines(current, proposed);
    let mut output = String::new();

    output.push_str(&format!("\x1b[1m--- {label} (current)\x1b[0m\n"));
    output.push_str(&format!("\x1b[1m+++ {label} (normalized)\x1b[0m\n"));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let (sign, color) = match change.tag() {
                    ChangeTag::Delete => ("-", "\x1b[31m"),
                    ChangeTag::Insert => ("+", "\x1b[32m"),
                    ChangeTag::Equal => (" ", ""),
                };
                output.push_str(color);
                output.push_str(sign);
                output.push_str(change.value());
                if change.missing_newline() {
                    output.push('\n');
                }
                if !color.is_empty() {
                    output.push_str("\x1b[0m");
                }
            }
        }
    }

    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_schema(dir: &TempDir, schema: &serde_json::Value) -> PathBuf {
        let path = dir.path().join("openapi.json");
        fs::write(&path, serde_json::to_string_pretty(schema).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_check_reports_pending_names() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(
            &dir,
            &json!({ "properties": { "created_at": { "type": "string" }, "id": { "type": "string" } },
                     "required": ["created_at", "id"] }),
        );

        let outcome = check(&path).unwrap();
        assert_eq!(outcome.pending, 2);
        assert!(outcome.diff.contains("\"created_at\""));
        assert!(outcome.diff.contains("\"createdAt\""));
    }

    #[test]
    fn test_check_exit_codes() {
        let dir = TempDir::new().unwrap();
        let dirty = write_schema(&dir, &json!({ "properties": { "user_id": {} } }));
        let args = |input: PathBuf| CheckArgs {
            input: Some(input),
            diff: true,
            config: None,
        };
        assert_eq!(run(args(dirty)), 1);

        let clean_dir = TempDir::new().unwrap();
        let clean = write_schema(&clean_dir, &json!({ "properties": { "userId": {} } }));
        assert_eq!(run(args(clean)), 0);
    }

    #[test]
    fn test_unified_diff_marks_changes() {
        let diff = unified_diff("api.json", "a\nuser_id\nc\n", "a\nuserId\nc\n");
        assert!(diff.contains("--- api.json (current)"));
        assert!(diff.contains("\x1b[31m-user_id\n"));
        assert!(diff.contains("\x1b[32m+userId\n"));
        assert!(diff.contains(" a\n"));
    }
}
