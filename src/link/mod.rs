//! Link planning and materialization.
//!
//! Planning turns the resolved graph plus the on-disk location of every
//! package into a [`LinkPlan`]: filesystem actions and shell registrations.
//! [`apply`] then converges the filesystem to the plan.
//!
//! Per package, in topological order:
//!
//! | Declaration        | Actions                                                       |
//! |--------------------|---------------------------------------------------------------|
//! | `linkin`           | symlink `<dependency>[/inner]` → `<package>/<outer>`          |
//! | `bin`              | make executable, symlink or copy into `<home>/bin/<name>`     |
//! | `lib_dirs`         | register lib dir, symlink into `<home>/modules/<name>`        |
//! | `shell_config`     | register shell entry                                          |
//! | `plugin_paths`     | register plugin                                               |
//!
//! Only `linkin` applies to packages scoped [`NodeScope::LinkInOnly`]; home
//! actions need a managed home.
//!
//! Every source path must stay inside its package directory
//! ([`NumngError::PathEscape`]); two actions writing one target with different
//! sources are a [`NumngError::LinkConflict`]. A package whose actions fail
//! planning contributes nothing, and the failure is reported for it alone.
//!
//! Actions and registrations are owned by graph node index, so two versions of
//! one package never share a failure.

mod apply;
pub mod discover;

pub use apply::{ApplyReport, LinkRecord, apply};

use crate::config::BinMode;
use crate::core::NumngError;
use crate::manifest::{PackageDeclaration, ShellEntryKind};
use crate::resolver::{NodeScope, ResolvedGraph};
use crate::utils::{atomic_write, filesystem_safe, safe_join};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// A fetched (or local) package ready to be materialized.
#[derive(Debug, Clone)]
pub struct PackageLocation {
    /// Package directory, including the path offset
    pub dir: PathBuf,
    /// Effective declaration, after in-package metadata was merged in
    pub declaration: PackageDeclaration,
}

/// Where home actions go.
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Managed home; without one, bin and module links are not planned
    pub home: Option<PathBuf>,
    pub bin_mode: BinMode,
}

impl LinkOptions {
    #[must_use]
    pub fn bin_dir(&self) -> Option<PathBuf> {
        self.home.as_ref().map(|home| home.join("bin"))
    }

    #[must_use]
    pub fn modules_dir(&self) -> Option<PathBuf> {
        self.home.as_ref().map(|home| home.join("modules"))
    }
}

/// A filesystem action, owned by the graph node at index `node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    Symlink {
        node: usize,
        source: PathBuf,
        target: PathBuf,
    },
    Copy {
        node: usize,
        source: PathBuf,
        target: PathBuf,
    },
    MakeExecutable {
        node: usize,
        path: PathBuf,
    },
}

impl LinkAction {
    #[must_use]
    pub const fn node(&self) -> usize {
        match self {
            Self::Symlink {
                node,
                ..
            }
            | Self::Copy {
                node,
                ..
            }
            | Self::MakeExecutable {
                node,
                ..
            } => *node,
        }
    }

    /// Path the action writes, if it creates one.
    #[must_use]
    pub fn target(&self) -> Option<&Path> {
        match self {
            Self::Symlink {
                target,
                ..
            }
            | Self::Copy {
                target,
                ..
            } => Some(target),
            Self::MakeExecutable {
                ..
            } => None,
        }
    }
}

/// One entry for the shell-integration writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Registration {
    Shell {
        package: String,
        entry: ShellEntryKind,
        path: PathBuf,
    },
    LibDir {
        package: String,
        name: String,
        path: PathBuf,
    },
    Plugin {
        package: String,
        path: PathBuf,
    },
}

/// Which file the registrations are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Loaded with `source`: every entry
    Script,
    /// Loaded with `overlay use`: no `source` entries and no lib dirs
    Overlay,
}

/// Registrations in topological package order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
    pub entries: Vec<Registration>,
}

impl Registrations {
    /// The subset of entries `artifact` carries.
    #[must_use]
    pub fn for_artifact(&self, artifact: Artifact) -> Self {
        let entries = match artifact {
            Artifact::Script => self.entries.clone(),
            Artifact::Overlay => self
                .entries
                .iter()
                .filter(|entry| {
                    !matches!(
                        entry,
                        Registration::LibDir { .. }
                            | Registration::Shell {
                                entry: ShellEntryKind::Source,
                                ..
                            }
                    )
                })
                .cloned()
                .collect(),
        };
        Self {
            home: self.home.clone(),
            entries,
        }
    }

    /// Writes the document as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_vec_pretty(self).context("Failed to serialize registrations")?;
        content.push(b'\n');
        atomic_write(path, &content)
            .with_context(|| format!("Failed to write registrations to {}", path.display()))?;
        tracing::debug!(target: "link", "wrote {} registrations to {}", self.entries.len(), path.display());
        Ok(())
    }
}

/// Planned actions and registrations, plus the packages that failed planning.
#[derive(Debug, Clone, Default)]
pub struct LinkPlan {
    pub actions: Vec<LinkAction>,
    /// `(node index, registration)` in topological order
    pub registrations: Vec<(usize, Registration)>,
    pub home: Option<PathBuf>,
    /// Directories whose recorded, unplanned entries are removed after apply
    pub managed_dirs: Vec<PathBuf>,
    /// Owner of every node, by index
    pub owners: Vec<LinkOwner>,
    /// Nodes that contribute nothing this run; links they own are kept
    pub unavailable: BTreeSet<usize>,
    /// `(node index, error)` for packages whose actions could not be planned
    pub failures: Vec<(usize, NumngError)>,
}

/// Who wrote a recorded home entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOwner {
    /// `identity@ref` of the node
    pub key: String,
    pub package: String,
}

impl LinkPlan {
    /// Every path the plan writes.
    pub fn targets(&self) -> impl Iterator<Item = &Path> {
        self.actions.iter().filter_map(LinkAction::target)
    }

    /// Whether `path` sits directly inside a managed directory.
    #[must_use]
    pub fn is_managed(&self, path: &Path) -> bool {
        path.parent().is_some_and(|parent| self.managed_dirs.iter().any(|dir| dir == parent))
    }

    /// The registration document without the entries of `excluded` nodes.
    #[must_use]
    pub fn registrations_without(&self, excluded: &BTreeSet<usize>) -> Registrations {
        Registrations {
            home: self.home.clone(),
            entries: self
                .registrations
                .iter()
                .filter(|(node, _)| !excluded.contains(node))
                .map(|(_, registration)| registration.clone())
                .collect(),
        }
    }
}

/// Plans the materialization of `graph`.
///
/// `locations[i]` is the location of node `i`, or `None` when the node is not
/// available (failed or blocked); unavailable nodes and links into them are
/// skipped.
#[must_use]
pub fn plan(graph: &ResolvedGraph, locations: &[Option<PackageLocation>], options: &LinkOptions) -> LinkPlan {
    let mut plan = LinkPlan {
        home: options.home.clone(),
        managed_dirs: options.bin_dir().into_iter().chain(options.modules_dir()).collect(),
        owners: graph
            .nodes()
            .iter()
            .map(|node| LinkOwner {
                key: node.key.to_string(),
                package: node.name.clone(),
            })
            .collect(),
        ..LinkPlan::default()
    };
    // target → source of the planned writes
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

    for (index, node) in graph.nodes().iter().enumerate() {
        let Some(Some(location)) = locations.get(index) else {
            plan.unavailable.insert(index);
            continue;
        };
        let planned = plan_package(graph, index, location, locations, options);
        let result = planned.and_then(|(actions, registrations)| {
            claim_targets(&claimed, &actions)?;
            Ok((actions, registrations))
        });

        match result {
            Ok((actions, registrations)) => {
                for action in &actions {
                    if let LinkAction::Symlink {
                        source,
                        target,
                        ..
                    }
                    | LinkAction::Copy {
                        source,
                        target,
                        ..
                    } = action
                    {
                        claimed.insert(target.clone(), source.clone());
                    }
                }
                tracing::trace!(target: "link", "{}: {} actions", node.name, actions.len());
                plan.actions.extend(actions);
                plan.registrations.extend(registrations.into_iter().map(|r| (index, r)));
            }
            Err(err) => {
                tracing::debug!(target: "link", "planning {} failed: {err}", node.name);
                plan.unavailable.insert(index);
                plan.failures.push((index, err));
            }
        }
    }

    dedupe(&mut plan.actions);
    plan
}

/// Fails when a target is already claimed with a different source.
fn claim_targets(claimed: &HashMap<PathBuf, PathBuf>, actions: &[LinkAction]) -> Result<(), NumngError> {
    let mut local: HashMap<&Path, &Path> = HashMap::new();
    for action in actions {
        let (source, target) = match action {
            LinkAction::Symlink {
                source,
                target,
                ..
            }
            | LinkAction::Copy {
                source,
                target,
                ..
            } => (source.as_path(), target.as_path()),
            LinkAction::MakeExecutable {
                ..
            } => continue,
        };
        let existing = claimed.get(target).map(PathBuf::as_path).or_else(|| local.get(target).copied());
        if let Some(existing) = existing
            && existing != source
        {
            return Err(NumngError::LinkConflict {
                target: target.to_path_buf(),
                reason: format!(
                    "planned for both {} and {}",
                    existing.display(),
                    source.display()
                ),
            });
        }
        local.insert(target, source);
    }
    Ok(())
}

fn dedupe(actions: &mut Vec<LinkAction>) {
    let mut seen = Vec::with_capacity(actions.len());
    actions.retain(|action| {
        if seen.contains(action) {
            false
        } else {
            seen.push(action.clone());
            true
        }
    });
}

/// Safe name for a file inside a managed directory.
fn home_entry_name(name: &str, dir: &Path) -> Result<String, NumngError> {
    let safe = filesystem_safe(name);
    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        return Err(NumngError::PathEscape {
            path: name.to_string(),
            base: dir.to_path_buf(),
        });
    }
    Ok(safe)
}

/// Splits a `linkin` key into `(inner, outer)`.
fn split_link_spec(spec: &str) -> (&str, &str) {
    spec.split_once(':').unwrap_or(("", spec))
}

fn plan_package(
    graph: &ResolvedGraph,
    index: usize,
    location: &PackageLocation,
    locations: &[Option<PackageLocation>],
    options: &LinkOptions,
) -> Result<(Vec<LinkAction>, Vec<Registration>), NumngError> {
    let node = &graph.nodes()[index];
    let dir = &location.dir;
    let mut actions = Vec::new();
    let mut registrations = Vec::new();

    for edge in &node.link_in {
        let Some(Some(dependency)) = locations.get(edge.target) else {
            continue;
        };
        let (inner, outer) = split_link_spec(&edge.spec);
        let target = safe_join(dir, outer)?;
        if target == *dir {
            return Err(NumngError::PathEscape {
                path: edge.spec.clone(),
                base: dir.clone(),
            });
        }
        actions.push(LinkAction::Symlink {
            node: index,
            source: safe_join(&dependency.dir, inner)?,
            target,
        });
    }

    if node.scope == NodeScope::LinkInOnly {
        return Ok((actions, registrations));
    }

    let declaration = discover::expand(&location.declaration, dir);

    if let Some(bin) = &declaration.bin {
        for (name, relative) in bin {
            let source = safe_join(dir, relative)?;
            let Some(bin_dir) = options.bin_dir() else {
                continue;
            };
            let target = bin_dir.join(home_entry_name(name, &bin_dir)?);
            actions.push(LinkAction::MakeExecutable {
                node: index,
                path: source.clone(),
            });
            actions.push(match options.bin_mode {
                BinMode::Symlink => LinkAction::Symlink {
                    node: index,
                    source,
                    target,
                },
                BinMode::Copy => LinkAction::Copy {
                    node: index,
                    source,
                    target,
                },
            });
        }
    }

    if let Some(lib_dirs) = &declaration.lib_dirs {
        for (name, relative) in lib_dirs {
            let path = safe_join(dir, relative)?;
            if let Some(modules_dir) = options.modules_dir() {
                actions.push(LinkAction::Symlink {
                    node: index,
                    source: path.clone(),
                    target: modules_dir.join(home_entry_name(name, &modules_dir)?),
                });
            }
            registrations.push(Registration::LibDir {
                package: node.name.clone(),
                name: name.clone(),
                path,
            });
        }
    }

    if let Some(shell_config) = &declaration.shell_config {
        for (kind, paths) in shell_config {
            for relative in paths {
                registrations.push(Registration::Shell {
                    package: node.name.clone(),
                    entry: *kind,
                    path: safe_join(dir, relative)?,
                });
            }
        }
    }

    for relative in declaration.plugin_paths.iter().flatten() {
        registrations.push(Registration::Plugin {
            package: node.name.clone(),
            path: safe_join(dir, relative)?,
        });
    }

    Ok((actions, registrations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryIndex;
    use crate::resolver::Resolver;
    use std::collections::BTreeMap;

    fn dep(name: &str, uri: &str) -> PackageDeclaration {
        PackageDeclaration {
            name: Some(name.to_string()),
            source_uri: Some(uri.to_string()),
            ..PackageDeclaration::default()
        }
    }

    fn located(graph: &ResolvedGraph, base: &Path) -> Vec<Option<PackageLocation>> {
        graph
            .nodes()
            .iter()
            .map(|node| {
                Some(PackageLocation {
                    dir: if node.is_root() { base.join("project") } else { base.join("store").join(&node.name) },
                    declaration: node.declaration.clone(),
                })
            })
            .collect()
    }

    fn resolve(root: &PackageDeclaration) -> ResolvedGraph {
        let registry = RegistryIndex::default();
        Resolver::new(&registry).resolve(root, Path::new("/work/project")).unwrap()
    }

    #[test]
    fn test_plan_materialization() {
        let mut tool = dep("tool", "https://x.org/tool");
        tool.bin = Some(BTreeMap::from([("tool".to_string(), "bin/tool.nu".to_string())]));
        tool.lib_dirs = Some(BTreeMap::from([("tool-lib".to_string(), "lib".to_string())]));
        tool.shell_config = Some(BTreeMap::from([
            (ShellEntryKind::Source, vec!["a.nu".to_string()]),
            (ShellEntryKind::UseAll, vec!["b.nu".to_string()]),
        ]));
        tool.plugin_paths = Some(vec!["target/release/nu_plugin_x".to_string()]);
        let root = PackageDeclaration {
            depends: Some(vec![tool]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);
        let base = Path::new("/base");
        let options = LinkOptions {
            home: Some(PathBuf::from("/home/u/numng/home")),
            bin_mode: BinMode::Symlink,
        };

        let plan = plan(&graph, &located(&graph, base), &options);
        let tool = graph.nodes().iter().position(|n| n.name == "tool").unwrap();

        assert!(plan.failures.is_empty());
        assert!(plan.unavailable.is_empty());
        assert_eq!(plan.owners[tool].key, graph.nodes()[tool].key.to_string());
        assert_eq!(
            plan.actions,
            vec![
                LinkAction::MakeExecutable {
                    node: tool,
                    path: PathBuf::from("/base/store/tool/bin/tool.nu"),
                },
                LinkAction::Symlink {
                    node: tool,
                    source: PathBuf::from("/base/store/tool/bin/tool.nu"),
                    target: PathBuf::from("/home/u/numng/home/bin/tool"),
                },
                LinkAction::Symlink {
                    node: tool,
                    source: PathBuf::from("/base/store/tool/lib"),
                    target: PathBuf::from("/home/u/numng/home/modules/tool-lib"),
                },
            ]
        );
        assert_eq!(plan.registrations.len(), 4);
        assert!(plan.registrations.iter().all(|(node, _)| *node == tool));
        let overlay = plan.registrations_without(&BTreeSet::new()).for_artifact(Artifact::Overlay);
        assert_eq!(overlay.entries.len(), 2);
        assert!(matches!(
            &overlay.entries[0],
            Registration::Shell { entry: ShellEntryKind::UseAll, .. }
        ));
        assert!(matches!(&overlay.entries[1], Registration::Plugin { .. }));
        assert_eq!(plan.managed_dirs.len(), 2);
    }

    #[test]
    fn test_plan_without_home_only_registers() {
        let mut tool = dep("tool", "https://x.org/tool");
        tool.bin = Some(BTreeMap::from([("tool".to_string(), "tool.nu".to_string())]));
        tool.lib_dirs = Some(BTreeMap::from([("lib".to_string(), "lib".to_string())]));
        let root = PackageDeclaration {
            depends: Some(vec![tool]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);

        let plan = plan(&graph, &located(&graph, Path::new("/b")), &LinkOptions::default());
        assert!(plan.actions.is_empty());
        assert_eq!(plan.registrations.len(), 1);
        assert!(plan.managed_dirs.is_empty());
    }

    #[test]
    fn test_plan_link_in() {
        let mut parent = dep("parent", "https://x.org/parent");
        parent.link_in = Some(BTreeMap::from([
            ("vendor/helper".to_string(), dep("helper", "https://x.org/helper")),
            ("src:vendor/other".to_string(), dep("other", "https://x.org/other")),
        ]));
        let root = PackageDeclaration {
            depends: Some(vec![parent]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);

        let plan = plan(&graph, &located(&graph, Path::new("/b")), &LinkOptions::default());
        let mut symlinks: Vec<(PathBuf, PathBuf)> = plan
            .actions
            .iter()
            .filter_map(|a| match a {
                LinkAction::Symlink {
                    source,
                    target,
                    ..
                } => Some((source.clone(), target.clone())),
                _ => None,
            })
            .collect();
        symlinks.sort();
        assert_eq!(
            symlinks,
            vec![
                (PathBuf::from("/b/store/helper"), PathBuf::from("/b/store/parent/vendor/helper")),
                (PathBuf::from("/b/store/other/src"), PathBuf::from("/b/store/parent/vendor/other")),
            ]
        );
    }

    #[test]
    fn test_link_in_only_nodes_register_nothing() {
        let mut helper = dep("helper", "https://x.org/helper");
        helper.shell_config = Some(BTreeMap::from([(ShellEntryKind::Use, vec!["h.nu".to_string()])]));
        let mut parent = dep("parent", "https://x.org/parent");
        parent.link_in = Some(BTreeMap::from([("vendor/helper".to_string(), helper)]));
        let root = PackageDeclaration {
            depends: Some(vec![parent]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);

        let plan = plan(&graph, &located(&graph, Path::new("/b")), &LinkOptions::default());
        assert!(plan.registrations.is_empty());
        assert_eq!(plan.actions.len(), 1);
    }

    #[test]
    fn test_sibling_link_in_collision() {
        let mut parent = dep("parent", "https://x.org/parent");
        parent.link_in = Some(BTreeMap::from([
            ("a:vendor/x".to_string(), dep("one", "https://x.org/one")),
            ("b:vendor/x".to_string(), dep("two", "https://x.org/two")),
        ]));
        let root = PackageDeclaration {
            depends: Some(vec![parent]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);

        let plan = plan(&graph, &located(&graph, Path::new("/b")), &LinkOptions::default());
        assert_eq!(plan.failures.len(), 1);
        let (index, err) = &plan.failures[0];
        assert_eq!(graph.nodes()[*index].name, "parent");
        assert!(matches!(err, NumngError::LinkConflict { target, .. } if target == Path::new("/b/store/parent/vendor/x")));
    }

    #[test]
    fn test_bin_collision_across_packages() {
        let mut one = dep("one", "https://x.org/one");
        one.bin = Some(BTreeMap::from([("tool".to_string(), "tool.nu".to_string())]));
        let mut two = dep("two", "https://x.org/two");
        two.bin = Some(BTreeMap::from([("tool".to_string(), "tool.nu".to_string())]));
        let root = PackageDeclaration {
            depends: Some(vec![one, two]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);
        let options = LinkOptions {
            home: Some(PathBuf::from("/h/o/m/e")),
            bin_mode: BinMode::Copy,
        };

        let plan = plan(&graph, &located(&graph, Path::new("/b")), &options);
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(graph.nodes()[plan.failures[0].0].name, "two");
        let one = graph.nodes().iter().position(|n| n.name == "one").unwrap();
        assert!(plan.actions.iter().any(|a| matches!(a, LinkAction::Copy { node, .. } if *node == one)));
        assert!(plan.unavailable.contains(&plan.failures[0].0));
    }

    #[test]
    fn test_escaping_paths_rejected() {
        let mut evil = dep("evil", "https://x.org/evil");
        evil.shell_config = Some(BTreeMap::from([(ShellEntryKind::Source, vec!["../../etc/profile".to_string()])]));
        let mut nameless = dep("nameless", "https://x.org/nameless");
        nameless.bin = Some(BTreeMap::from([("..".to_string(), "x.nu".to_string())]));
        let root = PackageDeclaration {
            depends: Some(vec![evil, nameless]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);
        let options = LinkOptions {
            home: Some(PathBuf::from("/h/o/m/e")),
            bin_mode: BinMode::Symlink,
        };

        let plan = plan(&graph, &located(&graph, Path::new("/b")), &options);
        assert_eq!(plan.failures.len(), 2);
        assert!(plan.failures.iter().all(|(_, e)| matches!(e, NumngError::PathEscape { .. })));
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn test_unavailable_nodes_skipped() {
        let mut parent = dep("parent", "https://x.org/parent");
        parent.link_in = Some(BTreeMap::from([("vendor/h".to_string(), dep("helper", "https://x.org/helper"))]));
        parent.shell_config = Some(BTreeMap::from([(ShellEntryKind::Use, vec!["p.nu".to_string()])]));
        let root = PackageDeclaration {
            depends: Some(vec![parent]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);
        let mut locations = located(&graph, Path::new("/b"));
        let helper = graph.nodes().iter().position(|n| n.name == "helper").unwrap();
        locations[helper] = None;

        let plan = plan(&graph, &locations, &LinkOptions::default());
        assert!(plan.actions.is_empty());
        assert_eq!(plan.registrations.len(), 1);
        assert_eq!(plan.unavailable, BTreeSet::from([helper]));
    }

    #[test]
    fn test_registrations_filtered_by_node() {
        let mut v1 = dep("lib", "https://x.org/lib");
        v1.git_ref = Some("v1".to_string());
        v1.shell_config = Some(BTreeMap::from([(ShellEntryKind::Use, vec!["lib.nu".to_string()])]));
        let mut v2 = v1.clone();
        v2.git_ref = Some("v2".to_string());
        let root = PackageDeclaration {
            depends: Some(vec![v1, v2]),
            ..PackageDeclaration::default()
        };
        let graph = resolve(&root);
        let plan = plan(&graph, &located(&graph, Path::new("/b")), &LinkOptions::default());
        assert_eq!(plan.registrations.len(), 2);

        let second = plan.registrations[1].0;
        let kept = plan.registrations_without(&BTreeSet::from([second]));
        assert_eq!(kept.entries, vec![plan.registrations[0].1.clone()]);
    }

    #[test]
    fn test_registrations_json_shape() {
        let registrations = Registrations {
            home: None,
            entries: vec![Registration::Shell {
                package: "p".to_string(),
                entry: ShellEntryKind::UseAll,
                path: PathBuf::from("/x/p.nu"),
            }],
        };
        let json = serde_json::to_value(&registrations).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"entries": [{"kind": "shell", "package": "p", "entry": "use_all", "path": "/x/p.nu"}]})
        );
    }
}
