//! The persisted store index (`<store>/index.json`).
//!
//! ```json
//! {
//!   "entries": {
//!     "3f1c…": {
//!       "identity": "git+https://github.com/me/webserver.nu",
//!       "uri": "https://github.com/me/webserver.nu",
//!       "git_ref": "v0.8.1",
//!       "path": "/home/me/.local/share/nushell/numng/store/worktrees/3f1c…",
//!       "state": "ready",
//!       "commit": "9a0d…",
//!       "ref_count": 2,
//!       "last_used": "2026-10-19T09:12:44Z"
//!     }
//!   }
//! }
//! ```
//!
//! Every change is a locked read-modify-write followed by an atomic replace, so
//! concurrent numng processes never observe a half-written index.

use super::lock::StoreLock;
use crate::constants::STORE_INDEX_FILE;
use crate::utils::atomic_write;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Lifecycle of a store entry: `missing → fetching → ready`, `ready → stale`
/// after a pull, back to `missing` on failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    #[default]
    Missing,
    Fetching,
    Ready,
    Stale,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Missing => "missing",
            Self::Fetching => "fetching",
            Self::Ready => "ready",
            Self::Stale => "stale",
        };
        f.write_str(text)
    }
}

/// One persisted store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// Rendered source identity
    pub identity: String,
    /// URI git talks to
    pub uri: String,
    pub git_ref: String,
    /// Worktree root
    pub path: PathBuf,
    pub state: EntryState,
    pub commit: Option<String>,
    /// Nodes that used this entry in the most recent run
    #[serde(default)]
    pub ref_count: usize,
    pub last_used: DateTime<Utc>,
}

/// All persisted entries, keyed by store key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIndex {
    #[serde(default)]
    pub entries: BTreeMap<String, StoreRecord>,
}

impl StoreIndex {
    fn path(store_dir: &Path) -> PathBuf {
        store_dir.join(STORE_INDEX_FILE)
    }

    /// Reads the index without locking; a missing file is an empty index.
    pub fn load(store_dir: &Path) -> Result<Self> {
        let path = Self::path(store_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read store index {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Store index {} is corrupt; run `numng store clean`", path.display()))
    }

    fn save(&self, store_dir: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self).context("Failed to serialize store index")?;
        atomic_write(&Self::path(store_dir), &content)
    }

    /// Applies `change` under the index lock on the current thread.
    pub fn update_blocking<T>(store_dir: &Path, change: impl FnOnce(&mut Self) -> T) -> Result<T> {
        let _lock = StoreLock::acquire_blocking(store_dir, "index")?;
        let mut index = Self::load(store_dir)?;
        let result = change(&mut index);
        index.save(store_dir)?;
        Ok(result)
    }

    /// Applies `change` under the index lock on a blocking thread.
    pub async fn update<T, F>(store_dir: &Path, change: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Self) -> T + Send + 'static,
    {
        let store_dir = store_dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::update_blocking(&store_dir, change))
            .await
            .context("Failed to spawn blocking task for store index update")?
    }

    /// Reads the index on a blocking thread.
    pub async fn read(store_dir: &Path) -> Result<Self> {
        let store_dir = store_dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::load(&store_dir))
            .await
            .context("Failed to spawn blocking task for store index read")?
    }
}
