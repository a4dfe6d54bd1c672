//! Cross-process file locks for the content store.
//!
//! Locks live in `<store>/.locks/<name>.lock` and are held for the lifetime of
//! the [`StoreLock`] value:
//!
//! - `clone-<hash>`: serializes clone, fetch and worktree-add on one bare clone
//! - `entry-<store key>`: serializes work on one store entry
//! - `index`: guards read-modify-write of `index.json`
//!
//! Acquisition order is always entry → clone → index.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive lock on `<store>/.locks/<name>.lock`, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Waits for the lock without blocking the async runtime.
    pub async fn acquire(store_dir: &Path, name: &str) -> Result<Self> {
        let store_dir = store_dir.to_path_buf();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(&store_dir, &name))
            .await
            .context("Failed to spawn blocking task for lock acquisition")?
    }

    /// Waits for the lock on the current thread.
    pub fn acquire_blocking(store_dir: &Path, name: &str) -> Result<Self> {
        let locks_dir = store_dir.join(".locks");
        std::fs::create_dir_all(&locks_dir)
            .with_context(|| format!("Failed to create locks directory {}", locks_dir.display()))?;

        let path = locks_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        file.lock_exclusive().with_context(|| format!("Failed to acquire lock for: {name}"))?;
        tracing::trace!(target: "store::lock", "acquired {}", path.display());

        Ok(Self {
            file,
            path,
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self.file.unlock() {
            tracing::warn!(target: "store::lock", "Failed to unlock {}: {e}", self.path.display());
        }
    }
}
