//! Content store: a multi-version cache of package sources.
//!
//! # Layout
//!
//! ```text
//! <store>/
//! ├── index.json                       persisted entries (see [`index`])
//! ├── .locks/                          fs4 lock files (see [`lock`])
//! ├── git/<uri-segments>-<hash8>/bare.git   one shallow bare clone per source URI
//! └── worktrees/<store key>/           one detached worktree per (identity, ref)
//! ```
//!
//! The store key is `sha256(identity \0 ref)` in hex, so every version of every
//! package gets its own directory and versions never overwrite each other.
//!
//! # Ensuring an entry
//!
//! [`ContentStore::ensure`] returns a ready worktree for an identity at a ref:
//!
//! 1. A ready entry whose worktree exists is returned without network access.
//! 2. Otherwise, holding the clone lock: clone the bare repository if missing,
//!    fetch the ref shallowly and peel it to a commit (abbreviated hashes fall
//!    back to unshallowing), then add a detached worktree at that commit.
//! 3. The entry is persisted as `ready`.
//!
//! A failed or cancelled fetch removes the partial worktree and resets the entry
//! to `missing`. [`ContentStore::pull`] marks entries `stale`; stale entries are
//! refreshed in update mode and reused as they are otherwise.
//!
//! # Concurrency
//!
//! Within one process, concurrent `ensure` calls for the same key coordinate
//! through a `DashMap` of pending/ready slots: the first caller does the work,
//! later callers wait on a `Notify` and reuse the result. Across processes the
//! fs4 lock files serialize work per entry and per bare clone.

pub mod index;
pub mod lock;

pub use index::{EntryState, StoreIndex, StoreRecord};
pub use lock::StoreLock;

use crate::constants::{
    MAX_BACKOFF_DELAY_MS, PENDING_STATE_TIMEOUT, PRESERVED_BUILD_DIR, STARTING_BACKOFF_DELAY_MS,
};
use crate::core::NumngError;
use crate::git::{self, GitRepo};
use crate::manifest::SourceIdentity;
use crate::manifest::identity::normalize_uri;
use crate::utils::filesystem_safe;
use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;

/// Longest directory name derived from a URI (before the hash suffix).
const MAX_CLONE_DIR_NAME: usize = 64;

/// What to put into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureRequest {
    pub identity: SourceIdentity,
    /// URI handed to git (as declared, not normalized)
    pub uri: String,
    pub git_ref: String,
    /// Label for logs, usually the package name
    pub context: String,
    /// Number of graph nodes using this entry
    pub consumers: usize,
}

/// A ready store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub key: String,
    /// Worktree root
    pub path: PathBuf,
    /// Worktree root joined with the identity's path offset
    pub package_dir: PathBuf,
    pub commit: String,
    /// `Ready`, or `Stale` when reused outside update mode
    pub state: EntryState,
}

#[derive(Debug, Clone)]
enum Slot {
    /// Another task is working on this entry.
    Pending(Arc<Notify>),
    Ready(StoreEntry),
}

/// Takes the notify handle out of a pending slot so waiters can be woken.
fn pending_notify(slots: &DashMap<String, Slot>, key: &str) -> Option<Arc<Notify>> {
    slots.get(key).and_then(|slot| match slot.value() {
        Slot::Pending(notify) => Some(notify.clone()),
        Slot::Ready(_) => None,
    })
}

/// Clears a pending slot unless disarmed, waking its waiters. Runs on error
/// paths and when the owning future is dropped.
struct SlotGuard {
    slots: Arc<DashMap<String, Slot>>,
    key: String,
    armed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            let notify = pending_notify(&self.slots, &self.key);
            self.slots.remove(&self.key);
            if let Some(notify) = notify {
                notify.notify_waiters();
            }
        }
    }
}

/// Removes a partial worktree and resets its record to `missing` unless
/// disarmed.
struct FetchGuard {
    store_dir: PathBuf,
    key: String,
    worktree: PathBuf,
    armed: bool,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!(target: "store", "resetting partial entry {}", self.key);
        if self.worktree.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.worktree)
        {
            tracing::warn!(target: "store", "Failed to remove {}: {e}", self.worktree.display());
        }
        let key = self.key.clone();
        let reset = StoreIndex::update_blocking(&self.store_dir, move |index| {
            if let Some(record) = index.entries.get_mut(&key) {
                record.state = EntryState::Missing;
                record.commit = None;
            }
        });
        if let Err(e) = reset {
            tracing::warn!(target: "store", "Failed to reset store entry {}: {e:#}", self.key);
        }
    }
}

/// Handle to a content store directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
    slots: Arc<DashMap<String, Slot>>,
    update_mode: bool,
}

impl ContentStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            slots: Arc::new(DashMap::new()),
            update_mode: false,
        }
    }

    /// In update mode, stale entries are refreshed instead of reused.
    #[must_use]
    pub const fn with_update_mode(mut self, update_mode: bool) -> Self {
        self.update_mode = update_mode;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `sha256(identity \0 ref)` as lowercase hex.
    #[must_use]
    pub fn store_key(identity: &SourceIdentity, git_ref: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identity.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(git_ref.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn uri_hash(normalized_uri: &str) -> String {
        hex::encode(Sha256::digest(normalized_uri.as_bytes()))
    }

    /// Bare clone directory for a (normalized) URI.
    #[must_use]
    pub fn clone_dir(&self, normalized_uri: &str) -> PathBuf {
        let without_scheme = normalized_uri.split_once("://").map_or(normalized_uri, |(_, rest)| rest);
        let mut name = without_scheme
            .split(['/', ':', '@'])
            .map(filesystem_safe)
            .filter(|part| !part.is_empty() && part != "." && part != "..")
            .collect::<Vec<_>>()
            .join("_");
        name.truncate(MAX_CLONE_DIR_NAME);
        let hash = Self::uri_hash(normalized_uri);
        self.dir.join("git").join(format!("{name}-{}", &hash[..8])).join("bare.git")
    }

    #[must_use]
    pub fn worktree_dir(&self, key: &str) -> PathBuf {
        self.dir.join("worktrees").join(key)
    }

    fn clone_lock_name(normalized_uri: &str) -> String {
        format!("clone-{}", &Self::uri_hash(normalized_uri)[..16])
    }

    /// Returns a ready worktree for `request`, fetching it when needed.
    ///
    /// # Errors
    ///
    /// [`NumngError::Fetch`] or [`NumngError::RefNotFound`] (inside the
    /// `anyhow` chain) when the source cannot be fetched.
    pub async fn ensure(&self, request: &EnsureRequest) -> Result<StoreEntry> {
        let key = Self::store_key(&request.identity, &request.git_ref);
        let notify = Arc::new(Notify::new());

        loop {
            match self.slots.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(entry) => match entry.get() {
                    Slot::Ready(found) if found.path.exists() => {
                        let found = found.clone();
                        drop(entry);
                        tracing::debug!(target: "store", "({}) reusing {}", request.context, found.key);
                        return Ok(found);
                    }
                    Slot::Ready(_) => {
                        drop(entry);
                        self.slots.insert(key.clone(), Slot::Pending(notify.clone()));
                        break;
                    }
                    Slot::Pending(existing) => {
                        let existing = existing.clone();
                        // The future must exist before the slot is released or the
                        // wake-up can be missed.
                        let notified = existing.notified();
                        drop(entry);
                        tracing::debug!(
                            target: "store",
                            "({}) waiting for {} @ {}",
                            request.context,
                            request.identity,
                            request.git_ref
                        );
                        tokio::select! {
                            () = notified => continue,
                            () = tokio::time::sleep(PENDING_STATE_TIMEOUT) => {
                                tracing::warn!(
                                    target: "store",
                                    "Timeout waiting for {} @ {}, proceeding under the entry lock",
                                    request.identity,
                                    request.git_ref
                                );
                                break;
                            }
                        }
                    }
                },
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    entry.insert(Slot::Pending(notify.clone()));
                    break;
                }
            }
        }

        let mut slot_guard = SlotGuard {
            slots: self.slots.clone(),
            key: key.clone(),
            armed: true,
        };
        let entry = self.ensure_locked(request, &key).await?;

        let notify = pending_notify(&self.slots, &key);
        self.slots.insert(key.clone(), Slot::Ready(entry.clone()));
        slot_guard.armed = false;
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
        Ok(entry)
    }

    async fn ensure_locked(&self, request: &EnsureRequest, key: &str) -> Result<StoreEntry> {
        let _entry_lock = StoreLock::acquire(&self.dir, &format!("entry-{key}")).await?;
        let worktree = self.worktree_dir(key);
        let record = StoreIndex::read(&self.dir).await?.entries.get(key).cloned();

        if let Some(record) = record
            && worktree.join(".git").exists()
        {
            match record.state {
                EntryState::Ready => {
                    tracing::debug!(target: "store", "({}) store hit for {key}", request.context);
                    return self.reuse(request, key, &record).await;
                }
                EntryState::Stale if !self.update_mode => {
                    tracing::debug!(target: "store", "({}) reusing stale entry {key}", request.context);
                    return self.reuse(request, key, &record).await;
                }
                EntryState::Stale => return self.refresh(request, key).await,
                EntryState::Missing | EntryState::Fetching => {}
            }
        }

        self.fetch(request, key).await
    }

    async fn reuse(&self, request: &EnsureRequest, key: &str, record: &StoreRecord) -> Result<StoreEntry> {
        let worktree = self.worktree_dir(key);
        let commit = match &record.commit {
            Some(commit) => commit.clone(),
            None => git::head_commit(&worktree).await?,
        };
        self.record(request, key, record.state, &commit).await?;
        Ok(StoreEntry {
            key: key.to_string(),
            package_dir: request.identity.package_dir(&worktree),
            path: worktree,
            commit,
            state: record.state,
        })
    }

    async fn fetch(&self, request: &EnsureRequest, key: &str) -> Result<StoreEntry> {
        let worktree = self.worktree_dir(key);
        let mut guard = FetchGuard {
            store_dir: self.dir.clone(),
            key: key.to_string(),
            worktree: worktree.clone(),
            armed: true,
        };
        if worktree.exists() {
            tokio::fs::remove_dir_all(&worktree)
                .await
                .with_context(|| format!("Failed to remove stale worktree {}", worktree.display()))?;
        }
        self.record(request, key, EntryState::Fetching, "").await?;

        tracing::info!(
            target: "store",
            "fetching {} @ {}",
            git::strip_auth_from_url(&request.uri),
            request.git_ref
        );
        let normalized = normalize_uri(&request.uri);
        let commit = {
            let _clone_lock = StoreLock::acquire(&self.dir, &Self::clone_lock_name(&normalized)).await?;
            let clone_dir = self.clone_dir(&normalized);
            let repo = if GitRepo::new(&clone_dir).exists() {
                GitRepo::new(&clone_dir)
            } else {
                if clone_dir.exists() {
                    tokio::fs::remove_dir_all(&clone_dir).await?;
                }
                GitRepo::clone_bare(&request.uri, &clone_dir, &request.context).await?
            };
            let commit = repo.fetch_commit(&request.uri, &request.git_ref, &request.context).await?;
            repo.create_worktree(&worktree, &commit, &request.context).await?;
            commit
        };

        let package_dir = request.identity.package_dir(&worktree);
        wait_visible(&package_dir).await.map_err(|_| NumngError::Fetch {
            source_uri: git::strip_auth_from_url(&request.uri),
            reason: format!(
                "path offset '{}' does not exist at {}",
                request.identity.offset().unwrap_or("."),
                request.git_ref
            ),
        })?;

        self.record(request, key, EntryState::Ready, &commit).await?;
        guard.armed = false;
        tracing::debug!(target: "store", "({}) {key} ready at {commit}", request.context);

        Ok(StoreEntry {
            key: key.to_string(),
            path: worktree,
            package_dir,
            commit,
            state: EntryState::Ready,
        })
    }

    /// Moves a stale worktree to the current commit of its ref, keeping
    /// build output under the preserved directory.
    async fn refresh(&self, request: &EnsureRequest, key: &str) -> Result<StoreEntry> {
        let worktree = self.worktree_dir(key);
        let normalized = normalize_uri(&request.uri);
        let commit = {
            let _clone_lock = StoreLock::acquire(&self.dir, &Self::clone_lock_name(&normalized)).await?;
            let repo = GitRepo::new(self.clone_dir(&normalized));
            let commit = repo.fetch_commit(&request.uri, &request.git_ref, &request.context).await?;
            git::reset_worktree(&worktree, &commit, PRESERVED_BUILD_DIR, &request.context).await?;
            commit
        };
        tracing::info!(target: "store", "updated {} @ {} to {commit}", request.identity, request.git_ref);

        self.record(request, key, EntryState::Ready, &commit).await?;
        Ok(StoreEntry {
            key: key.to_string(),
            package_dir: request.identity.package_dir(&worktree),
            path: worktree,
            commit,
            state: EntryState::Ready,
        })
    }

    /// Writes the record of `key` (an empty commit clears it).
    async fn record(&self, request: &EnsureRequest, key: &str, state: EntryState, commit: &str) -> Result<()> {
        let record = StoreRecord {
            identity: request.identity.to_string(),
            uri: request.uri.clone(),
            git_ref: request.git_ref.clone(),
            path: self.worktree_dir(key),
            state,
            commit: (!commit.is_empty()).then(|| commit.to_string()),
            ref_count: request.consumers,
            last_used: Utc::now(),
        };
        let key = key.to_string();
        StoreIndex::update(&self.dir, move |index| {
            index.entries.insert(key, record);
        })
        .await
    }

    /// Fetches new commits for `identity` into its bare clone and marks its
    /// ready entries stale. Worktrees are not touched.
    ///
    /// Returns the number of entries marked stale.
    pub async fn pull(&self, identity: &SourceIdentity, uri: &str) -> Result<usize> {
        let normalized = normalize_uri(uri);
        {
            let _clone_lock = StoreLock::acquire(&self.dir, &Self::clone_lock_name(&normalized)).await?;
            let repo = GitRepo::new(self.clone_dir(&normalized));
            if !repo.exists() {
                tracing::debug!(target: "store", "nothing to pull for {identity}");
                return Ok(0);
            }
            repo.fetch_tags(uri, &identity.to_string()).await?;
        }

        let rendered = identity.to_string();
        let marked = StoreIndex::update(&self.dir, move |index| {
            let mut marked = 0;
            for record in index.entries.values_mut() {
                if record.identity == rendered && record.state == EntryState::Ready {
                    record.state = EntryState::Stale;
                    marked += 1;
                }
            }
            marked
        })
        .await?;

        if marked > 0 {
            self.slots.retain(|_, slot| matches!(slot, Slot::Pending(_)));
        }
        tracing::debug!(target: "store", "pulled {identity}, {marked} entries stale");
        Ok(marked)
    }

    /// Every persisted entry, keyed by store key.
    pub async fn list(&self) -> Result<Vec<(String, StoreRecord)>> {
        Ok(StoreIndex::read(&self.dir).await?.entries.into_iter().collect())
    }

    /// Removes entries unused for longer than `max_age`, then bare clones no
    /// remaining entry refers to. Returns the removed store keys.
    pub async fn gc(&self, max_age: Duration) -> Result<Vec<String>> {
        let max_age = chrono::Duration::from_std(max_age).context("max age is out of range")?;
        let cutoff = Utc::now() - max_age;
        let expired: Vec<(String, StoreRecord)> = self
            .list()
            .await?
            .into_iter()
            .filter(|(_, record)| record.last_used < cutoff)
            .collect();

        let mut removed = Vec::new();
        for (key, record) in expired {
            let _entry_lock = StoreLock::acquire(&self.dir, &format!("entry-{key}")).await?;
            let normalized = normalize_uri(&record.uri);
            {
                let _clone_lock = StoreLock::acquire(&self.dir, &Self::clone_lock_name(&normalized)).await?;
                let repo = GitRepo::new(self.clone_dir(&normalized));
                let worktree = self.worktree_dir(&key);
                if repo.exists() {
                    repo.remove_worktree(&worktree).await?;
                } else if worktree.exists() {
                    tokio::fs::remove_dir_all(&worktree).await?;
                }
            }
            let removed_key = key.clone();
            StoreIndex::update(&self.dir, move |index| {
                index.entries.remove(&removed_key);
            })
            .await?;
            self.slots.remove(&key);
            tracing::debug!(target: "store", "removed {key} ({} @ {})", record.identity, record.git_ref);
            removed.push(key);
        }

        let referenced: Vec<PathBuf> = self
            .list()
            .await?
            .iter()
            .map(|(_, record)| self.clone_dir(&normalize_uri(&record.uri)))
            .collect();
        let git_dir = self.dir.join("git");
        if git_dir.is_dir() {
            let mut clones = tokio::fs::read_dir(&git_dir).await?;
            while let Some(clone) = clones.next_entry().await? {
                let bare = clone.path().join("bare.git");
                if !referenced.contains(&bare) {
                    tracing::debug!(target: "store", "removing unreferenced clone {}", clone.path().display());
                    tokio::fs::remove_dir_all(clone.path()).await?;
                }
            }
        }
        Ok(removed)
    }

    /// Removes every clone, worktree and the index.
    pub async fn clean(&self) -> Result<()> {
        let _index_lock = StoreLock::acquire(&self.dir, "index").await?;
        for dir in ["git", "worktrees"] {
            let path = self.dir.join(dir);
            if path.exists() {
                tokio::fs::remove_dir_all(&path)
                    .await
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        let index = self.dir.join(crate::constants::STORE_INDEX_FILE);
        if index.exists() {
            tokio::fs::remove_file(&index).await?;
        }
        self.slots.clear();
        tracing::info!(target: "store", "cleaned {}", self.dir.display());
        Ok(())
    }
}

/// Waits for a freshly checked out path to become visible.
async fn wait_visible(path: &Path) -> std::io::Result<()> {
    let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
        .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
        .take(5);
    let path = path.to_path_buf();
    Retry::spawn(strategy, || {
        let path = path.clone();
        async move {
            tokio::fs::metadata(&path).await.map(|_| ()).inspect_err(|_| {
                tracing::trace!(target: "store", "{} not visible yet", path.display());
            })
        }
    })
    .await
}
