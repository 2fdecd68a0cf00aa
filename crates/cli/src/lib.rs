//! `meridian` command-line interface.
//!
//! Runs the schema normalizer as a pre-step of client code generation and
//! checks whether a schema document still needs it.

#![forbid(unsafe_code)]

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

#[derive(Parser)]
#[command(
    name = "meridian",
    version,
    about = "\x1b[36mmeridian\x1b[0m prepares OpenAPI schemas for client generation"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite snake_case property names to camelCase
    Normalize(commands::normalize::NormalizeArgs),
    /// Fail when a schema still has snake_case property names
    Check(commands::check::CheckArgs),
}

/// Parse `args` (program name first), run the command and return its exit code.
pub fn run_cli(args: Vec<String>) -> i32 {
    init_tracing();

    match Cli::try_parse_from(args) {
        Ok(cli) => match cli.command {
            Some(Commands::Normalize(args)) => commands::normalize::run(args),
            Some(Commands::Check(args)) => commands::check::run(args),
            None => {
                let mut cmd = Cli::command();
                let _ = cmd.print_help();
                println!();
                0
            }
        },
        Err(e) => {
            let code = e.exit_code();
            let _ = e.print();
            code
        }
    }
}

fn init_tracing() {
    // MERIDIAN_LOG is either a plain level ("debug") applied to meridian
    // crates or a full filter spec like "meridian_core=trace,meridian_cli=info"
    let filter = match std::env::var("MERIDIAN_LOG") {
        Ok(level) if is_plain_level(&level) => {
            format!("meridian_cli={level},meridian_core={level},meridian_common={level}")
        }
        Ok(spec) => spec,
        Err(_) => "meridian_cli=info,meridian_core=info,meridian_common=info".to_string(),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_filter(EnvFilter::new(filter));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn is_plain_level(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_levels() {
        assert!(is_plain_level("debug"));
        assert!(is_plain_level("WARN"));
        assert!(!is_plain_level("meridian_core=debug"));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["meridian", "check", "--input", "api.json", "--diff"]).unwrap();
        match cli.command {
            Some(Commands::Check(args)) => {
                assert!(args.diff);
                assert_eq!(args.input.unwrap().to_str(), Some("api.json"));
            }
            _ => unreachable!("expected the check subcommand"),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
