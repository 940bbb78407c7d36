//! Media tool location and preflight
//!
//! The tool binary lives in a `Binaries` directory next to the running
//! executable unless configuration points elsewhere.

use crate::config::ToolConfig;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Directory, relative to the executable, that holds bundled binaries
pub const BINARIES_DIR: &str = "Binaries";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Cannot locate the running executable: {0}")]
    NoExecutableDir(std::io::Error),

    #[error("Media tool not found at {0}")]
    NotFound(PathBuf),

    #[error("Media tool unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the full path of the media tool.
///
/// - An absolute `binary_name` is used unchanged
/// - Otherwise it is joined onto `binary_dir`, or `<exe dir>/Binaries`
/// - The platform executable suffix is added when the name has no extension
pub fn resolve_tool_path(cfg: &ToolConfig) -> Result<PathBuf, ToolError> {
    let name = Path::new(&cfg.binary_name);
    if name.is_absolute() {
        return Ok(name.to_path_buf());
    }

    let dir = match &cfg.binary_dir {
        Some(dir) => dir.clone(),
        None => executable_dir()?.join(BINARIES_DIR),
    };

    let mut path = dir.join(name);
    if path.extension().is_none() && !std::env::consts::EXE_SUFFIX.is_empty() {
        path.set_extension(std::env::consts::EXE_SUFFIX.trim_start_matches('.'));
    }
    Ok(path)
}

fn executable_dir() -> Result<PathBuf, ToolError> {
    let exe = std::env::current_exe().map_err(ToolError::NoExecutableDir)?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Extract the version token from a `<name> version <token> ...` banner.
///
/// Returns the raw token, e.g. `7.0.2`, `n8.0-12-gabc` or `N-113427-g...`.
pub fn parse_tool_version(output: &str) -> Option<String> {
    let line = output
        .lines()
        .find(|line| line.to_ascii_lowercase().contains(" version "))?;

    let lower = line.to_ascii_lowercase();
    let at = lower.find(" version ")? + " version ".len();
    line[at..].split_whitespace().next().map(str::to_string)
}

/// Check that the tool runs by executing `<tool> -version`.
///
/// Returns the parsed version token on success.
pub fn check_tool_available(path: &Path) -> Result<String, ToolError> {
    if !path.exists() {
        return Err(ToolError::NotFound(path.to_path_buf()));
    }

    let output = Command::new(path).arg("-version").output().map_err(|e| {
        ToolError::Unavailable(format!("{} -version failed: {}", path.display(), e))
    })?;

    if !output.status.success() {
        return Err(ToolError::Unavailable(format!(
            "{} -version exited with {}",
            path.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_tool_version(&stdout).ok_or_else(|| {
        ToolError::Unavailable(format!(
            "Could not parse version from output: {}",
            stdout.lines().next().unwrap_or("(empty)")
        ))
    })
}
