//! File system helpers shared by the store and the materializer.
//!
//! Writes that other processes may observe (the store index, registration documents)
//! go through [`atomic_write`]: write to a sibling temp file, `sync_all`, rename.
//! Paths supplied by package declarations are confined with [`safe_join`] so a
//! package can never point numng outside of its own directory.

use crate::core::NumngError;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Creates a directory and all parents if missing.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Writes `content` to `path` atomically.
///
/// The temp file lives in the same directory so the final rename never crosses
/// filesystems.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    ensure_dir(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
    Ok(())
}

/// Strips every character outside `[A-Za-z0-9_-. ]`.
///
/// Used for names that become file names (bin entries, module links, store
/// directories).
#[must_use]
pub fn filesystem_safe(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
        .collect()
}

/// Normalizes a relative path, dropping `.` components.
///
/// Absolute paths, `..` components and Windows prefixes are rejected with
/// [`NumngError::PathEscape`] against `base`.
pub fn normalize_relative(relative: &str, base: &Path) -> Result<PathBuf, NumngError> {
    let escape = || NumngError::PathEscape {
        path: relative.to_string(),
        base: base.to_path_buf(),
    };

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escape());
            }
        }
    }
    Ok(normalized)
}

/// Joins a declaration-supplied relative path onto `base`, refusing to leave it.
///
/// An empty or `.` path yields `base` itself.
pub fn safe_join(base: &Path, relative: &str) -> Result<PathBuf, NumngError> {
    Ok(base.join(normalize_relative(relative, base)?))
}

/// Whether `path` is a symlink (without following it).
#[must_use]
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Removes a file, a symlink or a whole directory tree.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to inspect {}", path.display()));
        }
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))
    }
}

/// Creates a symlink at `link` pointing to `target`.
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Creates a symlink at `link` pointing to `target`.
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}
