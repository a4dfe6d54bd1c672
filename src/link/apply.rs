//! Converging the filesystem to a [`LinkPlan`].
//!
//! Applying the same plan twice changes nothing the second time: matching
//! symlinks are left alone, executables keep their mode and copies are only
//! rewritten when their content differs.
//!
//! Entries numng writes into the managed home directories are listed in a
//! [`LinkRecord`] next to them. Only recorded entries are ever cleaned up, and
//! never while their package is unavailable or failed this run.

use super::{LinkAction, LinkOwner, LinkPlan};
use crate::constants::LINK_RECORD_FILE;
use crate::core::NumngError;
use crate::utils::fs::{create_symlink, is_symlink, remove_path};
use crate::utils::atomic_write;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// What [`apply`] did.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Paths created, replaced, re-moded or removed
    pub changes: usize,
    /// `(node index, error)` for actions that could not be applied
    pub failures: Vec<(usize, anyhow::Error)>,
}

impl ApplyReport {
    /// Indices of the nodes with at least one failed action.
    #[must_use]
    pub fn failed_nodes(&self) -> BTreeSet<usize> {
        self.failures.iter().map(|(node, _)| *node).collect()
    }
}

/// Home entries written by numng, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub entries: BTreeMap<String, LinkOwner>,
}

impl LinkRecord {
    /// Path of the record inside `home`.
    #[must_use]
    pub fn path(home: &Path) -> PathBuf {
        home.join(LINK_RECORD_FILE)
    }

    /// Loads the record; a missing file is an empty record.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_vec_pretty(self).context("Failed to serialize link record")?;
        content.push(b'\n');
        atomic_write(path, &content)
    }
}

/// Applies every action of `plan`, then removes recorded home entries the
/// plan no longer writes.
///
/// Existing paths that do not match the plan are a [`NumngError::LinkConflict`]
/// unless `force` is set. A failed action is reported for its node and does
/// not stop the others. Entries owned by an unavailable or failed package are
/// kept, so a broken rebuild leaves the previous install in place.
pub fn apply(plan: &LinkPlan, force: bool) -> ApplyReport {
    let mut report = ApplyReport::default();
    let mut written = Vec::new();
    for action in &plan.actions {
        match apply_action(action, force) {
            Ok(changed) => {
                report.changes += usize::from(changed);
                written.push(action);
            }
            Err(err) => {
                tracing::debug!(target: "link", "action for node {} failed: {err:#}", action.node());
                report.failures.push((action.node(), err));
            }
        }
    }

    if let Some(home) = &plan.home {
        let failed = report.failed_nodes();
        match converge_record(plan, &LinkRecord::path(home), &written, &failed) {
            Ok(removed) => report.changes += removed,
            Err(err) => tracing::warn!(target: "link", "Stale home entries were not cleaned: {err:#}"),
        }
    }

    tracing::debug!(target: "link", "applied {} actions, {} changes", plan.actions.len(), report.changes);
    report
}

/// Removes stale recorded entries and rewrites the record; returns the number
/// of removed paths.
fn converge_record(
    plan: &LinkPlan,
    record_path: &Path,
    written: &[&LinkAction],
    failed: &BTreeSet<usize>,
) -> Result<usize> {
    let previous = LinkRecord::load(record_path)?;

    let retained: Vec<&LinkOwner> =
        plan.unavailable.iter().chain(failed).filter_map(|node| plan.owners.get(*node)).collect();
    let is_retained = |owner: &LinkOwner| {
        retained.iter().any(|kept| kept.key == owner.key || kept.package == owner.package)
    };

    let mut record = LinkRecord::default();
    for action in written {
        if let Some(target) = action.target()
            && plan.is_managed(target)
            && let Some(owner) = plan.owners.get(action.node())
        {
            record.entries.entry(target.to_string_lossy().into_owned()).or_insert_with(|| owner.clone());
        }
    }

    let planned: HashSet<&Path> = plan.targets().collect();
    let mut removed = 0;
    for (target, owner) in &previous.entries {
        if record.entries.contains_key(target) {
            continue;
        }
        let path = Path::new(target);
        if !plan.is_managed(path) {
            continue;
        }
        if planned.contains(path) || is_retained(owner) {
            record.entries.insert(target.clone(), owner.clone());
            continue;
        }
        // a directory in its place is not ours anymore
        if !is_symlink(path) && !path.is_file() {
            continue;
        }
        match remove_path(path) {
            Ok(()) => {
                tracing::debug!(target: "link", "removed stale {} of {}", path.display(), owner.package);
                removed += 1;
            }
            Err(err) => {
                tracing::warn!(target: "link", "Failed to remove {}: {err:#}", path.display());
                record.entries.insert(target.clone(), owner.clone());
            }
        }
    }

    if record != previous {
        record.save(record_path)?;
    }
    Ok(removed)
}

/// Applies one action; `Ok(true)` when the filesystem changed.
fn apply_action(action: &LinkAction, force: bool) -> Result<bool> {
    match action {
        LinkAction::Symlink {
            source,
            target,
            ..
        } => ensure_symlink(source, target, force),
        LinkAction::Copy {
            source,
            target,
            ..
        } => ensure_copy(source, target, force),
        LinkAction::MakeExecutable {
            path,
            ..
        } => ensure_executable(path),
    }
}

fn conflict(target: &Path, reason: impl Into<String>) -> anyhow::Error {
    NumngError::LinkConflict {
        target: target.to_path_buf(),
        reason: reason.into(),
    }
    .into()
}

fn create_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn ensure_symlink(source: &Path, target: &Path, force: bool) -> Result<bool> {
    if is_symlink(target) {
        let current = fs::read_link(target)
            .with_context(|| format!("Failed to read link {}", target.display()))?;
        if current == source {
            return Ok(false);
        }
        if !force {
            return Err(conflict(target, format!("existing link points to {}", current.display())));
        }
        remove_path(target)?;
    } else if target.exists() {
        if !force {
            return Err(conflict(target, "a file or directory not managed by numng is in the way"));
        }
        remove_path(target)?;
    }

    create_parent(target)?;
    create_symlink(source, target).with_context(|| {
        format!("Failed to link {} -> {}", target.display(), source.display())
    })?;
    tracing::trace!(target: "link", "linked {} -> {}", target.display(), source.display());
    Ok(true)
}

fn ensure_copy(source: &Path, target: &Path, force: bool) -> Result<bool> {
    if is_symlink(target) || target.is_dir() {
        if !force {
            return Err(conflict(target, "expected a copied file"));
        }
        remove_path(target)?;
    } else if target.is_file() {
        let wanted = fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?;
        let existing = fs::read(target).with_context(|| format!("Failed to read {}", target.display()))?;
        if wanted == existing {
            return Ok(false);
        }
    }

    create_parent(target)?;
    fs::copy(source, target)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
    tracing::trace!(target: "link", "copied {} to {}", source.display(), target.display());
    Ok(true)
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let mode = metadata.permissions().mode();
    if mode & 0o100 != 0 {
        return Ok(false);
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o100))
        .with_context(|| format!("Failed to make {} executable", path.display()))?;
    Ok(true)
}

#[cfg(not(unix))]
fn ensure_executable(path: &Path) -> Result<bool> {
    fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(false)
}
