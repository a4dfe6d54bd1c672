//! Git operations on top of the system `git` binary.
//!
//! numng uses the installed git rather than an embedded implementation, so SSH
//! agents, credential helpers and user configuration keep working. All calls go
//! through [`GitCommand`]; this module adds the repository-level operations the
//! content store is built from:
//!
//! - shallow bare clones shared by every version of a source
//! - fetching a single ref and peeling it to a commit, with a full-history
//!   fallback for abbreviated commit hashes
//! - detached worktrees, one per store entry
//!
//! Callers serialize operations on one bare clone (see `store::lock`); git
//! itself writes `FETCH_HEAD` and worktree metadata without coordination.

pub mod command_builder;

pub use command_builder::{GitCommand, GitCommandOutput};

use crate::core::NumngError;
use std::path::{Path, PathBuf};

/// Handle to a (bare) repository on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `path` looks like a bare repository (has `HEAD` and `objects/`).
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.join("HEAD").is_file() && self.path.join("objects").is_dir()
    }

    /// Whether the repository has truncated history.
    #[must_use]
    pub fn is_shallow(&self) -> bool {
        self.path.join("shallow").is_file()
    }

    /// Creates a shallow bare clone of `url` at `target`.
    pub async fn clone_bare(url: &str, target: impl AsRef<Path>, context: &str) -> Result<Self, NumngError> {
        let target = target.as_ref();
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::debug!(target: "git", "({context}) cloning {}", strip_auth_from_url(url));
        GitCommand::clone_bare(url, target).with_context(context).execute_success().await?;
        Ok(Self::new(target))
    }

    /// Fetches `reference` from `origin` and returns the commit it points to.
    ///
    /// Branches and tags are fetched shallowly. When that fails and the ref looks
    /// like an abbreviated commit hash, the history is unshallowed and the hash
    /// verified locally instead.
    ///
    /// # Errors
    ///
    /// [`NumngError::RefNotFound`] when neither works, [`NumngError::Fetch`] for
    /// transport failures.
    pub async fn fetch_commit(&self, uri: &str, reference: &str, context: &str) -> Result<String, NumngError> {
        let fetched = GitCommand::fetch_ref(reference)
            .current_dir(&self.path)
            .with_source(uri)
            .with_context(context)
            .execute_success()
            .await;

        match fetched {
            Ok(()) => self.peel("FETCH_HEAD^{commit}", context).await,
            Err(err) if !looks_like_commit_hash(reference) => Err(err),
            Err(err) => {
                tracing::debug!(
                    target: "git",
                    "({context}) fetching {reference} failed ({err}), trying it as a commit hash"
                );
                if self.is_shallow() {
                    GitCommand::fetch_unshallow()
                        .current_dir(&self.path)
                        .with_source(uri)
                        .with_context(context)
                        .execute_success()
                        .await?;
                }
                self.peel(&format!("{reference}^{{commit}}"), context).await.map_err(|_| {
                    NumngError::RefNotFound {
                        source_uri: strip_auth_from_url(uri),
                        reference: reference.to_string(),
                    }
                })
            }
        }
    }

    /// Fetches new commits and tags from `origin` without touching worktrees.
    pub async fn fetch_tags(&self, uri: &str, context: &str) -> Result<(), NumngError> {
        GitCommand::fetch_tags()
            .current_dir(&self.path)
            .with_source(uri)
            .with_context(context)
            .execute_success()
            .await
    }

    /// Resolves `rev` to a full commit id.
    pub async fn peel(&self, rev: &str, context: &str) -> Result<String, NumngError> {
        GitCommand::rev_parse(rev)
            .current_dir(&self.path)
            .with_context(context)
            .execute_stdout()
            .await
    }

    /// Adds a detached worktree for `commit` at `path`.
    ///
    /// A failed add is retried once after `git worktree prune`, which clears
    /// registrations of worktrees whose directories were deleted.
    pub async fn create_worktree(&self, path: &Path, commit: &str, context: &str) -> Result<(), NumngError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let add = || {
            GitCommand::worktree_add_detached(path, commit)
                .current_dir(&self.path)
                .with_context(context)
        };

        match add().execute_success().await {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::debug!(target: "git", "({context}) worktree add failed ({first}), pruning and retrying");
                self.prune_worktrees().await?;
                if path.exists() {
                    tokio::fs::remove_dir_all(path).await?;
                }
                add().execute_success().await
            }
        }
    }

    /// Removes the worktree at `path`, deleting leftovers git does not know about.
    pub async fn remove_worktree(&self, path: &Path) -> Result<(), NumngError> {
        let removed =
            GitCommand::worktree_remove(path).current_dir(&self.path).execute_success().await;
        if let Err(err) = removed {
            tracing::debug!(target: "git", "worktree remove {} failed: {err}", path.display());
        }
        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
        }
        self.prune_worktrees().await
    }

    pub async fn prune_worktrees(&self) -> Result<(), NumngError> {
        GitCommand::worktree_prune().current_dir(&self.path).execute_success().await
    }
}

/// Resets a worktree to `commit`, keeping the preserved build directory.
///
/// Runs `git clean -fdx -e <preserved>` followed by `git checkout --detach --force`.
pub async fn reset_worktree(
    worktree: &Path,
    commit: &str,
    preserved: &str,
    context: &str,
) -> Result<(), NumngError> {
    GitCommand::clean(preserved).current_dir(worktree).with_context(context).execute_success().await?;
    GitCommand::checkout_detached(commit)
        .current_dir(worktree)
        .with_context(context)
        .execute_success()
        .await
}

/// Current `HEAD` commit of a work tree.
pub async fn head_commit(worktree: &Path) -> Result<String, NumngError> {
    GitCommand::rev_parse("HEAD").current_dir(worktree).execute_stdout().await
}

/// Whether `reference` could be an (abbreviated) commit hash: 7 to 40 hex digits.
#[must_use]
pub fn looks_like_commit_hash(reference: &str) -> bool {
    (7..=40).contains(&reference.len()) && reference.chars().all(|c| c.is_ascii_hexdigit())
}

/// Removes `user[:password]@` from HTTP(S) URLs before they are logged.
#[must_use]
pub fn strip_auth_from_url(url: &str) -> String {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            let authority_end = rest.find('/').unwrap_or(rest.len());
            if let Some(at) = rest[..authority_end].rfind('@') {
                return format!("{scheme}{}", &rest[at + 1..]);
            }
        }
    }
    url.to_string()
}
