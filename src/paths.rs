//! Centralized path resolution for phaseplan
//!
//! # Environment Variables
//!
//! - `PHASEPLAN_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PHASEPLAN_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/phaseplan` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\phaseplan`
//!    - macOS/Linux: `~/.config/phaseplan`
//!
//! For plan files, see [`resolve_plan_path`].

use crate::cli::PlanArgs;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PHASEPLAN_CONFIG_DIR";

/// Plan file name used when only a directory is given
pub const DEFAULT_PLAN_FILE: &str = "plan.yaml";

/// Get the phaseplan config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("phaseplan");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("phaseplan");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("phaseplan");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Join `-d` and `-f` into a plan path without touching the filesystem
///
/// - directory and file: `<dir>/<file>`
/// - directory only: `<dir>/plan.yaml`
/// - file only: the file as given
/// - neither: `./plan.yaml`
pub fn plan_path(args: &PlanArgs) -> PathBuf {
    match (&args.directory, &args.file) {
        (Some(dir), Some(file)) => expand(dir).join(file),
        (Some(dir), None) => expand(dir).join(DEFAULT_PLAN_FILE),
        (None, Some(file)) => expand(file),
        (None, None) => PathBuf::from(DEFAULT_PLAN_FILE),
    }
}

/// Resolve the plan path and require that it is an existing file
pub fn resolve_plan_path(args: &PlanArgs) -> Result<PathBuf> {
    let path = plan_path(args);
    if !path.is_file() {
        bail!("Plan file not found: {}", path.display());
    }
    log::debug!("Using plan file {}", path.display());
    Ok(path)
}

/// Directory holding a plan file, for sibling state files
pub fn plan_dir(plan: &Path) -> PathBuf {
    match plan.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
