//! Registry index: answers "best declaration for name + constraint".
//!
//! A registry maps package names to version tables:
//!
//! ```json
//! {
//!   "_": {"source_uri": "https://github.com/me/webserver.nu", "bin": {"webserver": "webserver.nu"}},
//!   "latest": "0.8",
//!   "0.8": "0.8.1",
//!   "0.8.1": {"git_ref": "v0.8.1"},
//!   "0.7.0": {"git_ref": "v0.7.0", "build_command": "cargo build --release"}
//! }
//! ```
//!
//! - `_` holds the fallback declaration every selected version is merged over
//! - a string value is an alias: another key of the table, or a constraint over it
//! - later registries override equal keys of earlier ones
//!
//! Supported sources are numng registries ([`NumngRegistry`], one `<name>.json`
//! per package), nupm registries ([`NupmRegistry`]) and in-memory tables
//! ([`InMemoryRegistry`]).

mod sources;

pub use sources::{InMemoryRegistry, NumngRegistry, NupmRegistry, open_registry};

use crate::constants::{FALLBACK_VERSION_KEY, MAX_ALIAS_DEPTH};
use crate::core::NumngError;
use crate::manifest::PackageDeclaration;
use crate::version::{Version, VersionConstraint, compare_candidates};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One value of a version table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    Declaration(PackageDeclaration),
    Alias(String),
}

/// Version key → value.
pub type VersionTable = BTreeMap<String, RegistryValue>;

/// A place registry tables are read from.
pub trait RegistrySource: Send + Sync {
    /// Human-readable location for messages.
    fn describe(&self) -> String;

    /// Every package name this source knows.
    fn package_names(&self) -> Result<Vec<String>, NumngError>;

    /// The version table of `name`, or `None` when the source does not know it.
    fn load_table(&self, name: &str) -> Result<Option<VersionTable>, NumngError>;
}

/// Result of a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryMatch {
    /// The selected declaration merged over the fallback
    pub declaration: PackageDeclaration,
    /// The concrete version key the alias chain ended at
    pub version: String,
}

/// Lookups over an ordered list of registry sources.
pub struct RegistryIndex {
    sources: Vec<Box<dyn RegistrySource>>,
    tables: DashMap<String, Option<Arc<VersionTable>>>,
}

impl std::fmt::Debug for RegistryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<String> = self.sources.iter().map(|s| s.describe()).collect();
        f.debug_struct("RegistryIndex").field("sources", &sources).finish()
    }
}

impl Default for RegistryIndex {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RegistryIndex {
    /// Index over `sources`, in declaration order.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn RegistrySource>>) -> Self {
        Self {
            sources,
            tables: DashMap::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Merged table of `name` across all sources, parsed once and cached.
    pub fn table(&self, name: &str) -> Result<Option<Arc<VersionTable>>, NumngError> {
        if let Some(cached) = self.tables.get(name) {
            return Ok(cached.clone());
        }

        let mut merged: Option<VersionTable> = None;
        for source in &self.sources {
            if let Some(table) = source.load_table(name)? {
                tracing::trace!(
                    target: "registry",
                    "{} lists {} versions of {name}",
                    source.describe(),
                    table.len()
                );
                merged.get_or_insert_with(BTreeMap::new).extend(table);
            }
        }

        let merged = merged.map(Arc::new);
        self.tables.insert(name.to_string(), merged.clone());
        Ok(merged)
    }

    /// Resolves `name` under `constraint` (`None` means any version).
    ///
    /// # Errors
    ///
    /// - [`NumngError::PackageNotFound`] when no registry knows `name`
    /// - [`NumngError::NoMatchingVersion`] when nothing satisfies the constraint
    /// - [`NumngError::AliasCycle`] when aliases loop or exceed the depth limit
    /// - [`NumngError::InvalidVersionSyntax`] for malformed constraints or aliases
    pub fn resolve(&self, name: &str, constraint: Option<&str>) -> Result<RegistryMatch, NumngError> {
        let table = self.table(name)?.ok_or_else(|| NumngError::PackageNotFound {
            name: name.to_string(),
            suggestion: self.closest_name(name),
        })?;

        let constraint_text = constraint.unwrap_or("");
        let parsed = VersionConstraint::parse(constraint_text)?;
        let start = best_key(&table, &parsed).ok_or_else(|| no_match(name, constraint_text, &table))?;

        let (version, declaration) = follow_aliases(name, &table, start)?;
        let mut declaration = declaration.clone();
        match table.get(FALLBACK_VERSION_KEY) {
            Some(RegistryValue::Declaration(fallback)) => declaration.fill_missing(fallback),
            Some(RegistryValue::Alias(_)) => {
                return Err(NumngError::InvalidRegistryFormat {
                    path: name.into(),
                    reason: "the '_' fallback must be a declaration, not an alias".to_string(),
                });
            }
            None => {}
        }
        if declaration.name.is_none() {
            declaration.name = Some(name.to_string());
        }

        tracing::debug!(
            target: "registry",
            "resolved {name}@{} to version {version}",
            if constraint_text.is_empty() { "*" } else { constraint_text }
        );
        Ok(RegistryMatch {
            declaration,
            version,
        })
    }

    /// Closest known package name by Jaro-Winkler similarity.
    #[must_use]
    pub fn closest_name(&self, name: &str) -> Option<String> {
        let mut best: Option<(f64, String)> = None;
        for source in &self.sources {
            let Ok(names) = source.package_names() else {
                continue;
            };
            for candidate in names {
                let score = strsim::jaro_winkler(name, &candidate);
                if score >= 0.8 && best.as_ref().is_none_or(|(s, _)| score > *s) {
                    best = Some((score, candidate));
                }
            }
        }
        best.map(|(_, candidate)| candidate)
    }
}

fn best_key(table: &VersionTable, constraint: &VersionConstraint) -> Option<String> {
    constraint
        .select_best(table.keys().map(String::as_str).filter(|k| *k != FALLBACK_VERSION_KEY))
        .map(ToString::to_string)
}

fn no_match(name: &str, constraint: &str, table: &VersionTable) -> NumngError {
    let mut available: Vec<&String> =
        table.keys().filter(|k| k.as_str() != FALLBACK_VERSION_KEY).collect();
    available.sort_by(|a, b| compare_candidates((&Version::from_key(b), b), (&Version::from_key(a), a)));
    NumngError::NoMatchingVersion {
        name: name.to_string(),
        constraint: constraint.to_string(),
        available: available.into_iter().cloned().collect(),
    }
}

/// Follows alias values from `start` until a declaration is reached.
fn follow_aliases<'a>(
    name: &str,
    table: &'a VersionTable,
    start: String,
) -> Result<(String, &'a PackageDeclaration), NumngError> {
    let mut chain = vec![start.clone()];
    let mut key = start;

    loop {
        match table.get(&key) {
            Some(RegistryValue::Declaration(declaration)) => return Ok((key, declaration)),
            Some(RegistryValue::Alias(target)) => {
                if chain.len() > MAX_ALIAS_DEPTH {
                    return Err(NumngError::AliasCycle {
                        name: name.to_string(),
                        chain,
                    });
                }
                let next = if table.contains_key(target) && target != FALLBACK_VERSION_KEY {
                    target.clone()
                } else {
                    let parsed = VersionConstraint::parse(target)?;
                    best_key(table, &parsed).ok_or_else(|| no_match(name, target, table))?
                };
                let revisited = chain.contains(&next);
                chain.push(next.clone());
                if revisited {
                    return Err(NumngError::AliasCycle {
                        name: name.to_string(),
                        chain,
                    });
                }
                key = next;
            }
            None => return Err(no_match(name, &key, table)),
        }
    }
}
