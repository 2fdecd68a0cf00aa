pub mod check;
pub mod normalize;

use meridian_common::{ProjectConfig, config_path, read_config};
use std::path::{Path, PathBuf};

/// Run a command body, printing its error to stderr.
pub fn run_command<F>(f: F) -> i32
where
    F: FnOnce() -> Result<(), String>,
{
    match f() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

/// Load the project configuration, from `explicit` or from `meridian.toml`
/// in the current directory, along with the directory its paths are
/// relative to.
pub fn load_config(explicit: Option<&Path>) -> Result<(ProjectConfig, PathBuf), String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to resolve current directory: {e}"))?;
    let path = explicit.map_or_else(|| config_path(&cwd), Path::to_path_buf);
    let root = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or(cwd, Path::to_path_buf);
    Ok((read_config(&path)?, root))
}
