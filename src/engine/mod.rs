//! The build pipeline.
//!
//! [`Engine::run`] drives one invocation end to end:
//!
//! 1. Load the root package file.
//! 2. Fetch every registry source into the store and open it.
//! 3. Resolve the dependency graph. Any error up to here aborts the run.
//! 4. With `pull_updates`, fetch new commits for every source and mark their
//!    store entries stale.
//! 5. Ensure every package in the store, in parallel, and merge in the
//!    metadata each package ships about itself. Dependencies listed in that
//!    metadata are resolved and fetched in further rounds until no new
//!    package shows up.
//! 6. Run build commands in topological order.
//! 7. Plan and apply links, then write the registration documents.
//!
//! From step 5 on, failures are confined to the failing package and the
//! packages that need it; everything else is still installed. The returned
//! [`EngineReport`] carries per-package outcomes, and
//! [`EngineReport::into_result`] turns failures into a single
//! [`NumngError::SubgraphFailures`].

pub mod report;

pub use report::{EngineReport, NodeStatus};

use crate::build::{BuildOutcome, BuildRunner};
use crate::config::{BinMode, GlobalConfig, validate_managed_home};
use crate::constants::MAX_DISCOVERY_ROUNDS;
use crate::core::{FailureStage, NumngError};
use crate::link::{self, Artifact, LinkOptions, PackageLocation, Registrations};
use crate::manifest::{self, PackageDeclaration, SourceIdentity};
use crate::registry::{RegistryIndex, open_registry};
use crate::resolver::{DiscoveredDepends, NodeKey, ResolvedGraph, ResolvedNode, Resolver};
use crate::store::{ContentStore, EnsureRequest};
use crate::utils::{ProgressBar, absolutize, ensure_dir};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A fetched package and the dependencies its metadata lists.
type Fetched = (PackageLocation, Option<Vec<PackageDeclaration>>);

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Root package file; its directory is the project directory
    pub package_file: PathBuf,
    pub store_dir: PathBuf,
    /// Managed home for bin and module links
    pub home: Option<PathBuf>,
    /// Registrations for `source`
    pub script_file: Option<PathBuf>,
    /// Registrations for `overlay use`
    pub overlay_file: Option<PathBuf>,
    pub pull_updates: bool,
    /// Replace link targets that are in the way
    pub force: bool,
    pub max_parallel: usize,
    pub build_shell: Vec<String>,
    pub bin_mode: BinMode,
    pub show_progress: bool,
}

impl EngineOptions {
    /// Options with the settings of `config` and everything else off.
    #[must_use]
    pub fn new(package_file: impl Into<PathBuf>, store_dir: impl Into<PathBuf>, config: &GlobalConfig) -> Self {
        Self {
            package_file: package_file.into(),
            store_dir: store_dir.into(),
            home: None,
            script_file: None,
            overlay_file: None,
            pull_updates: false,
            force: false,
            max_parallel: config.max_parallel(),
            build_shell: config.build_shell.clone(),
            bin_mode: config.bin_mode,
            show_progress: false,
        }
    }
}

/// Runs the pipeline against one content store.
#[derive(Debug, Clone)]
pub struct Engine {
    options: EngineOptions,
    store: ContentStore,
}

impl Engine {
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        let store = ContentStore::new(&options.store_dir).with_update_mode(options.pull_updates);
        Self {
            options,
            store,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Runs the whole pipeline.
    ///
    /// # Errors
    ///
    /// Errors before and during resolution (unreadable package file, registry
    /// failures, version and cycle errors) abort the run. Later failures are
    /// reported in the returned [`EngineReport`].
    pub async fn run(&self) -> Result<EngineReport> {
        let options = &self.options;
        if let Some(home) = &options.home {
            validate_managed_home(home)?;
        }

        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let package_file = absolutize(&options.package_file, &cwd);
        let root = manifest::load_package_file(&package_file).await?;
        let project_dir = package_file
            .parent()
            .context("Package file has no parent directory")?;
        let project_dir = tokio::fs::canonicalize(project_dir)
            .await
            .with_context(|| format!("Failed to resolve project directory {}", project_dir.display()))?;

        let registry = self.load_registries(&root).await?;
        let (graph, mut statuses, mut locations) = self.resolve_and_fetch(&registry, &root, &project_dir).await?;
        for index in 0..graph.len() {
            block_dependents(&graph, &mut statuses, index);
        }

        let mut warnings = Vec::new();
        self.build(&graph, &locations, &mut statuses, &mut warnings).await;
        for (status, location) in statuses.iter().zip(locations.iter_mut()) {
            if !status.is_ready() {
                *location = None;
            }
        }

        let (registrations, link_changes) = self.link(&graph, &locations, &mut statuses).await?;
        self.write_registrations(&registrations)?;

        let failed = statuses.iter().filter(|s| !s.is_ready()).count();
        tracing::info!(
            target: "engine",
            "done: {} packages, {failed} failed, {link_changes} link changes",
            graph.len()
        );

        Ok(EngineReport {
            graph,
            statuses,
            warnings,
            registrations,
            link_changes,
        })
    }

    /// Fetches and opens every registry of the root, in declaration order.
    async fn load_registries(&self, root: &PackageDeclaration) -> Result<RegistryIndex> {
        let mut sources = Vec::with_capacity(root.registry.len());
        for declaration in &root.registry {
            let identity = SourceIdentity::from_declaration(declaration)?;
            let uri = declaration.source_uri.clone().unwrap_or_default();
            let context = format!("registry {}", declaration.name.as_deref().unwrap_or(identity.uri()));

            if self.options.pull_updates
                && let Err(e) = self.store.pull(&identity, &uri).await
            {
                tracing::warn!(target: "engine", "Failed to pull {identity}: {e:#}");
            }
            let entry = self
                .store
                .ensure(&EnsureRequest {
                    identity: identity.clone(),
                    uri,
                    git_ref: declaration.git_ref_or_default().to_string(),
                    context: context.clone(),
                    consumers: 1,
                })
                .await
                .with_context(|| format!("Failed to fetch {context}"))?;

            let format = declaration.package_format.unwrap_or_default();
            let source = open_registry(format, &entry.package_dir)?;
            tracing::debug!(target: "engine", "opened {}", source.describe());
            sources.push(source);
        }
        Ok(RegistryIndex::new(sources))
    }

    /// Resolves and fetches until fetched metadata names no new dependencies.
    ///
    /// Every round resolves from scratch with the dependencies discovered so
    /// far; entries fetched in earlier rounds are already ready in the store.
    async fn resolve_and_fetch(
        &self,
        registry: &RegistryIndex,
        root: &PackageDeclaration,
        project_dir: &Path,
    ) -> Result<(ResolvedGraph, Vec<NodeStatus>, Vec<Option<PackageLocation>>)> {
        let mut discovered = DiscoveredDepends::new();
        let mut round = 1;
        loop {
            let graph = Resolver::new(registry).with_discovered(&discovered).resolve(root, project_dir)?;
            if round == 1 && self.options.pull_updates {
                self.pull(&graph).await;
            }

            let mut statuses = vec![NodeStatus::Ready; graph.len()];
            let (locations, found) = self.fetch(&graph, project_dir, &mut statuses).await;
            let fresh: Vec<(NodeKey, Vec<PackageDeclaration>)> =
                found.into_iter().filter(|(key, _)| !discovered.contains_key(key)).collect();
            if fresh.is_empty() {
                return Ok((graph, statuses, locations));
            }
            if round == MAX_DISCOVERY_ROUNDS {
                tracing::warn!(
                    target: "engine",
                    "Package metadata still lists new dependencies after {round} rounds; installing what was resolved"
                );
                return Ok((graph, statuses, locations));
            }

            tracing::debug!(target: "engine", "round {round}: {} packages list their own dependencies", fresh.len());
            discovered.extend(fresh);
            round += 1;
        }
    }

    /// Pulls every distinct source of the graph; failures are left for the
    /// fetch to report.
    async fn pull(&self, graph: &ResolvedGraph) {
        let mut pulled = BTreeSet::new();
        for node in graph.nodes().iter().filter(|n| !n.is_root()) {
            let Some(uri) = node.declaration.source_uri.as_deref() else {
                continue;
            };
            if !pulled.insert(node.key.identity.clone()) {
                continue;
            }
            if let Err(e) = self.store.pull(&node.key.identity, uri).await {
                tracing::warn!(target: "engine", "Failed to pull {}: {e:#}", node.key.identity);
            }
        }
    }

    fn request_for(graph: &ResolvedGraph, index: usize, node: &ResolvedNode) -> Result<EnsureRequest, NumngError> {
        let uri = node.declaration.source_uri.clone().ok_or_else(|| NumngError::PackageNotFound {
            name: node.name.clone(),
            suggestion: None,
        })?;
        let consumers = graph.nodes().iter().filter(|n| n.prerequisites().any(|p| p == index)).count();
        Ok(EnsureRequest {
            identity: node.key.identity.clone(),
            uri,
            git_ref: node.key.git_ref.clone(),
            context: node.name.clone(),
            consumers,
        })
    }

    /// Ensures every package in the store; returns the location of each node
    /// that is available and the dependencies fetched packages list in their
    /// own metadata.
    async fn fetch(
        &self,
        graph: &ResolvedGraph,
        project_dir: &Path,
        statuses: &mut [NodeStatus],
    ) -> (Vec<Option<PackageLocation>>, DiscoveredDepends) {
        let mut locations: Vec<Option<PackageLocation>> = vec![None; graph.len()];
        let mut requests = Vec::new();
        for (index, node) in graph.nodes().iter().enumerate() {
            if node.is_root() {
                locations[index] = Some(PackageLocation {
                    dir: project_dir.to_path_buf(),
                    declaration: node.declaration.clone(),
                });
                continue;
            }
            match Self::request_for(graph, index, node) {
                Ok(request) => requests.push((index, request, node.declaration.clone())),
                Err(e) => {
                    statuses[index] = NodeStatus::Failed {
                        stage: FailureStage::Fetch,
                        message: e.to_string(),
                    };
                }
            }
        }

        let total = requests.len();
        tracing::info!(target: "engine", "fetching {total} packages");
        let progress = ProgressBar::new(total as u64, !self.options.show_progress);
        progress.set_prefix("Fetching");
        let concurrency = self.options.max_parallel.max(1);

        let results: Vec<(usize, Result<Fetched>)> = stream::iter(requests)
            .map(|(index, request, declaration)| {
                let store = self.store.clone();
                let progress = progress.clone();
                async move {
                    let result = async {
                        let entry = store.ensure(&request).await?;
                        let (declaration, depends) =
                            with_package_metadata(declaration, entry.package_dir.clone()).await?;
                        let location = PackageLocation {
                            dir: entry.package_dir,
                            declaration,
                        };
                        Ok::<_, anyhow::Error>((location, depends))
                    }
                    .await;
                    progress.set_message(request.context.clone());
                    progress.inc(1);
                    (index, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        progress.finish_and_clear();

        let mut discovered = DiscoveredDepends::new();
        for (index, result) in results {
            match result {
                Ok((location, depends)) => {
                    if let Some(depends) = depends {
                        discovered.insert(graph.nodes()[index].key.clone(), depends);
                    }
                    locations[index] = Some(location);
                }
                Err(e) => {
                    tracing::debug!(target: "engine", "fetching {} failed: {e:#}", graph.nodes()[index].name);
                    statuses[index] = NodeStatus::Failed {
                        stage: FailureStage::Fetch,
                        message: format!("{e:#}"),
                    };
                }
            }
        }
        (locations, discovered)
    }

    /// Runs build commands in topological order, blocking the dependents of
    /// every failed build.
    async fn build(
        &self,
        graph: &ResolvedGraph,
        locations: &[Option<PackageLocation>],
        statuses: &mut [NodeStatus],
        warnings: &mut Vec<NumngError>,
    ) {
        let allow = graph.root().is_some_and(|root| root.declaration.allows_build_commands());
        let runner = BuildRunner::new(self.options.build_shell.clone(), allow);

        for (index, node) in graph.nodes().iter().enumerate() {
            if !statuses[index].is_ready() {
                continue;
            }
            let Some(location) = &locations[index] else {
                continue;
            };

            let command = location.declaration.build_command.as_deref();
            match runner.build(&node.name, &location.dir, command, node.is_root()).await {
                Ok(BuildOutcome::Denied(warning)) => warnings.push(warning),
                Ok(BuildOutcome::Built | BuildOutcome::NoCommand) => {}
                Err(e) => {
                    statuses[index] = NodeStatus::Failed {
                        stage: FailureStage::Build,
                        message: e.to_string(),
                    };
                    block_dependents(graph, statuses, index);
                }
            }
        }
    }

    /// Plans and applies links for every available package.
    async fn link(
        &self,
        graph: &ResolvedGraph,
        locations: &[Option<PackageLocation>],
        statuses: &mut [NodeStatus],
    ) -> Result<(Registrations, usize)> {
        let options = LinkOptions {
            home: self.options.home.clone(),
            bin_mode: self.options.bin_mode,
        };
        for dir in options.bin_dir().into_iter().chain(options.modules_dir()) {
            ensure_dir(&dir)?;
        }

        let mut plan = link::plan(graph, locations, &options);
        for (index, e) in plan.failures.drain(..) {
            statuses[index] = NodeStatus::Failed {
                stage: FailureStage::Link,
                message: e.to_string(),
            };
        }

        let force = self.options.force;
        let (plan, report) = tokio::task::spawn_blocking(move || {
            let report = link::apply(&plan, force);
            (plan, report)
        })
        .await
        .context("Failed to spawn blocking task for linking")?;

        for (index, e) in &report.failures {
            if statuses[*index].is_ready() {
                statuses[*index] = NodeStatus::Failed {
                    stage: FailureStage::Link,
                    message: format!("{e:#}"),
                };
            }
        }
        let excluded: BTreeSet<usize> = (0..graph.len()).filter(|index| !statuses[*index].is_ready()).collect();
        tracing::info!(target: "engine", "linked {} actions", plan.actions.len());
        Ok((plan.registrations_without(&excluded), report.changes))
    }

    fn write_registrations(&self, registrations: &Registrations) -> Result<()> {
        if let Some(path) = &self.options.script_file {
            registrations.for_artifact(Artifact::Script).write(path)?;
        }
        if let Some(path) = &self.options.overlay_file {
            registrations.for_artifact(Artifact::Overlay).write(path)?;
        }
        Ok(())
    }
}

/// Marks every ready dependent of the failed node `failed` as blocked by it.
fn block_dependents(graph: &ResolvedGraph, statuses: &mut [NodeStatus], failed: usize) {
    let NodeStatus::Failed {
        stage,
        ..
    } = &statuses[failed]
    else {
        return;
    };
    let stage = *stage;
    let by = &graph.nodes()[failed].name;

    let mut dependents: Vec<usize> = graph.dependents_of(failed).into_iter().collect();
    dependents.sort_unstable();
    for dependent in dependents {
        if statuses[dependent].is_ready() {
            tracing::debug!(target: "engine", "{} is blocked by {by}", graph.nodes()[dependent].name);
            statuses[dependent] = NodeStatus::Blocked {
                stage,
                by: by.clone(),
            };
        }
    }
}

/// Fills unset materialization fields from the package's own metadata.
///
/// Also returns the dependencies the metadata lists, unless the declaration
/// already names its own.
async fn with_package_metadata(
    mut declaration: PackageDeclaration,
    dir: PathBuf,
) -> Result<(PackageDeclaration, Option<Vec<PackageDeclaration>>)> {
    let format = declaration.package_format.unwrap_or_default();
    let name = declaration.display_name().to_string();
    let metadata = tokio::task::spawn_blocking(move || manifest::read_package_metadata(&dir, format))
        .await
        .context("Failed to spawn blocking task for package metadata")?
        .with_context(|| format!("Failed to read package metadata of '{name}'"))?;

    let Some(metadata) = metadata else {
        return Ok((declaration, None));
    };
    declaration.fill_materialization(&metadata);
    let depends = match (&declaration.depends, metadata.depends) {
        (None, Some(depends)) if !depends.is_empty() => {
            tracing::debug!(target: "engine", "{name} lists {} dependencies in its own metadata", depends.len());
            Some(depends)
        }
        _ => None,
    };
    Ok((declaration, depends))
}
