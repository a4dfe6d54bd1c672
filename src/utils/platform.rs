//! Platform helpers: path expansion and executable lookup.

use crate::core::NumngError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Returns the user's home directory.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine home directory.\n\n\
             Please ensure the HOME environment variable is set"
        )
    })
}

/// Expands `~` and environment variables in a user-supplied path.
///
/// Relative results are kept relative; callers decide what they are relative to.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| {
        format!(
            "Failed to expand path: {path}\n\n\
             Common issues:\n\
             - Undefined environment variable (e.g., $UNDEFINED_VAR)\n\
             - Invalid variable syntax (use $VAR or ${{VAR}})"
        )
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Makes `path` absolute against `cwd` without touching the filesystem.
#[must_use]
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Checks whether a command is available on `PATH`.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Locates the `git` executable.
pub fn find_git() -> Result<PathBuf, NumngError> {
    which::which("git").map_err(|_| NumngError::GitNotFound)
}
