//! Dependency resolution.
//!
//! The resolver expands the root declaration breadth-first into a complete
//! graph of concrete packages:
//!
//! 1. Each `depends` and `linkin` reference is turned into a concrete declaration:
//!    declarations with a `source_uri` are used as they are, anything else is
//!    filled from the [`RegistryIndex`] (explicit fields win).
//! 2. The concrete declaration gets a [`NodeKey`] (`source identity + git ref`).
//!    Equal keys are one node: the first declaration wins and divergent later
//!    ones are logged. Equal names with different keys coexist.
//! 3. A reference back into its own expansion chain is a
//!    [`NumngError::CyclicDependency`]; cycles closed through already expanded
//!    nodes are caught by the final graph check.
//!
//! The result is a [`ResolvedGraph`] in topological order (dependencies first,
//! ties in first-encounter order) with the root last. Nodes only reachable
//! through `linkin` are scoped [`NodeScope::LinkInOnly`]: they are fetched and
//! linked into their parent, but contribute no registrations of their own.
//!
//! Resolution does no I/O besides registry lookups. Dependencies a fetched
//! package declares in its own metadata are fed back in with
//! [`Resolver::with_discovered`] and the graph is resolved again.

pub mod dependency_graph;

pub use dependency_graph::DependencyGraph;

use crate::core::NumngError;
use crate::manifest::{PackageDeclaration, SourceIdentity};
use crate::registry::RegistryIndex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;

/// One physical store entry: a source identity at a git ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub identity: SourceIdentity,
    pub git_ref: String,
}

impl NodeKey {
    /// Key of the root package in `project_dir`.
    #[must_use]
    pub fn root(project_dir: &Path) -> Self {
        Self {
            identity: SourceIdentity::local(project_dir),
            git_ref: String::new(),
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.identity.is_local()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "{}", self.identity)
        } else {
            write!(f, "{}@{}", self.identity, self.git_ref)
        }
    }
}

/// Why a node is part of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeScope {
    /// Reachable from the root through `depends`
    Environment,
    /// Only reachable through some package's `linkin`
    LinkInOnly,
}

/// A `linkin` edge: `spec` is the `[inner:]outer` key of the parent's map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInEdge {
    pub spec: String,
    pub target: usize,
}

/// A concrete package in the resolved graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    pub name: String,
    pub key: NodeKey,
    /// The declaration after registry filling
    pub declaration: PackageDeclaration,
    /// Registry version key the declaration was selected under
    pub registry_version: Option<String>,
    pub scope: NodeScope,
    /// Indices (into [`ResolvedGraph::nodes`]) of `depends` targets
    pub depends: Vec<usize>,
    pub link_in: Vec<LinkInEdge>,
}

impl ResolvedNode {
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.key.is_root()
    }

    /// Every node this one needs before it can be built: `depends` and `linkin` targets.
    pub fn prerequisites(&self) -> impl Iterator<Item = usize> + '_ {
        self.depends.iter().copied().chain(self.link_in.iter().map(|edge| edge.target))
    }
}

/// Resolution result in topological order; the root is the last node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGraph {
    nodes: Vec<ResolvedNode>,
}

impl ResolvedGraph {
    #[must_use]
    pub fn nodes(&self) -> &[ResolvedNode] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ResolvedNode> {
        self.nodes.get(index)
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> Option<&ResolvedNode> {
        self.nodes.last()
    }

    /// First node named `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ResolvedNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Indices of every node that needs `index`, directly or indirectly.
    #[must_use]
    pub fn dependents_of(&self, index: usize) -> HashSet<usize> {
        let mut dependents = HashSet::new();
        let mut queue = VecDeque::from([index]);
        while let Some(current) = queue.pop_front() {
            for (candidate, node) in self.nodes.iter().enumerate() {
                if node.prerequisites().any(|p| p == current) && dependents.insert(candidate) {
                    queue.push_back(candidate);
                }
            }
        }
        dependents
    }
}

/// Dependencies found in fetched package metadata, by the node that lists them.
pub type DiscoveredDepends = HashMap<NodeKey, Vec<PackageDeclaration>>;

/// Expands root declarations against a registry index.
#[derive(Debug)]
pub struct Resolver<'a> {
    registry: &'a RegistryIndex,
    discovered: Option<&'a DiscoveredDepends>,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub const fn new(registry: &'a RegistryIndex) -> Self {
        Self {
            registry,
            discovered: None,
        }
    }

    /// Also expands the dependencies listed in fetched package metadata.
    #[must_use]
    pub const fn with_discovered(mut self, discovered: &'a DiscoveredDepends) -> Self {
        self.discovered = Some(discovered);
        self
    }

    /// Resolves `root` (the package living in `project_dir`) into a graph.
    ///
    /// # Errors
    ///
    /// Registry failures ([`NumngError::PackageNotFound`],
    /// [`NumngError::NoMatchingVersion`], [`NumngError::AliasCycle`]), invalid
    /// path offsets and [`NumngError::CyclicDependency`].
    pub fn resolve(
        &self,
        root: &PackageDeclaration,
        project_dir: &Path,
    ) -> Result<ResolvedGraph, NumngError> {
        let mut builder = GraphBuilder::new(self.registry, self.discovered);
        let root_key = NodeKey::root(project_dir);
        let root_name = root.name.clone().unwrap_or_else(|| "root".to_string());
        builder.push_node(root_name, root_key, root.clone(), None, Vec::new());

        while let Some(expansion) = builder.queue.pop_front() {
            builder.expand(&expansion)?;
        }

        let graph = builder.finish()?;
        tracing::info!(
            target: "resolver",
            "resolved {} packages ({} link-in only)",
            graph.len(),
            graph.nodes().iter().filter(|n| n.scope == NodeScope::LinkInOnly).count()
        );
        Ok(graph)
    }
}

/// A node waiting for its references to be expanded, with its expansion chain.
struct Expansion {
    index: usize,
    chain: Vec<usize>,
}

struct GraphBuilder<'a> {
    registry: &'a RegistryIndex,
    discovered: Option<&'a DiscoveredDepends>,
    nodes: Vec<ResolvedNode>,
    by_key: HashMap<NodeKey, usize>,
    graph: DependencyGraph,
    queue: VecDeque<Expansion>,
}

impl<'a> GraphBuilder<'a> {
    fn new(registry: &'a RegistryIndex, discovered: Option<&'a DiscoveredDepends>) -> Self {
        Self {
            registry,
            discovered,
            nodes: Vec::new(),
            by_key: HashMap::new(),
            graph: DependencyGraph::new(),
            queue: VecDeque::new(),
        }
    }

    fn push_node(
        &mut self,
        name: String,
        key: NodeKey,
        declaration: PackageDeclaration,
        registry_version: Option<String>,
        parent_chain: Vec<usize>,
    ) -> usize {
        let index = self.graph.add_node(format!("{name} ({key})"));
        tracing::debug!(target: "resolver", "new node {index}: {name} at {key}");
        self.by_key.insert(key.clone(), index);
        self.nodes.push(ResolvedNode {
            name,
            key,
            declaration,
            registry_version,
            scope: NodeScope::LinkInOnly,
            depends: Vec::new(),
            link_in: Vec::new(),
        });
        let mut chain = parent_chain;
        chain.push(index);
        self.queue.push_back(Expansion {
            index,
            chain,
        });
        index
    }

    fn expand(&mut self, expansion: &Expansion) -> Result<(), NumngError> {
        let declaration = self.nodes[expansion.index].declaration.clone();
        let discovered = self
            .discovered
            .and_then(|found| found.get(&self.nodes[expansion.index].key))
            .map(Vec::as_slice)
            .unwrap_or_default();

        for reference in declaration.depends.iter().flatten().chain(discovered) {
            let child = self.visit(reference, expansion)?;
            let node = &mut self.nodes[expansion.index];
            if !node.depends.contains(&child) {
                node.depends.push(child);
            }
        }

        for (spec, reference) in declaration.link_in.iter().flatten() {
            let child = self.visit(reference, expansion)?;
            self.nodes[expansion.index].link_in.push(LinkInEdge {
                spec: spec.clone(),
                target: child,
            });
        }
        Ok(())
    }

    /// Resolves one reference of `parent` and returns the index of its node.
    fn visit(&mut self, reference: &PackageDeclaration, parent: &Expansion) -> Result<usize, NumngError> {
        let (declaration, registry_version) = self.concretize(reference)?;
        let identity = SourceIdentity::from_declaration(&declaration)?;
        let key = NodeKey {
            identity,
            git_ref: declaration.git_ref_or_default().to_string(),
        };

        let index = if let Some(&existing) = self.by_key.get(&key) {
            if parent.chain.contains(&existing) {
                return Err(self.cycle_error(&parent.chain, existing));
            }
            if self.nodes[existing].declaration != declaration {
                tracing::warn!(
                    target: "resolver",
                    "{} at {key} is declared differently by {}; keeping the first declaration",
                    self.nodes[existing].name,
                    self.nodes[parent.index].name
                );
            }
            existing
        } else {
            let name = declaration.name.clone().unwrap_or_else(|| fallback_name(&key.identity));
            self.push_node(name, key, declaration, registry_version, parent.chain.clone())
        };

        self.graph.add_dependency(parent.index, index);
        Ok(index)
    }

    /// Fills a reference from the registry when it has no source of its own.
    fn concretize(
        &self,
        reference: &PackageDeclaration,
    ) -> Result<(PackageDeclaration, Option<String>), NumngError> {
        if !reference.needs_registry() {
            return Ok((reference.clone(), None));
        }

        let name = reference.name.as_deref().ok_or_else(|| NumngError::SpecParse {
            package: None,
            field: "name".to_string(),
            reason: "a dependency without source_uri must name a registry package".to_string(),
        })?;
        if reference.ignores_registry() {
            return Err(NumngError::PackageNotFound {
                name: name.to_string(),
                suggestion: None,
            });
        }

        let found = self.registry.resolve(name, reference.version.as_deref())?;
        let mut declaration = reference.clone();
        declaration.fill_missing(&found.declaration);
        tracing::trace!(target: "resolver", "filled {name} from registry version {}", found.version);
        Ok((declaration, Some(found.version)))
    }

    fn cycle_error(&self, chain: &[usize], repeated: usize) -> NumngError {
        let start = chain.iter().position(|i| *i == repeated).unwrap_or(0);
        let mut names: Vec<String> = chain[start..]
            .iter()
            .map(|i| format!("{} ({})", self.nodes[*i].name, self.nodes[*i].key))
            .collect();
        names.push(format!("{} ({})", self.nodes[repeated].name, self.nodes[repeated].key));
        NumngError::CyclicDependency {
            chain: names.join(" -> "),
        }
    }

    /// Orders the nodes topologically, assigns scopes and remaps edge indices.
    fn finish(self) -> Result<ResolvedGraph, NumngError> {
        let order = self.graph.topological_order()?;

        let mut environment = HashSet::from([0]);
        let mut queue = VecDeque::from([0]);
        while let Some(current) = queue.pop_front() {
            for dep in &self.nodes[current].depends {
                if environment.insert(*dep) {
                    queue.push_back(*dep);
                }
            }
        }

        let mut position = vec![0; order.len()];
        for (new, old) in order.iter().enumerate() {
            position[*old] = new;
        }

        let mut slots: Vec<Option<ResolvedNode>> = self.nodes.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        for old in order {
            let Some(mut node) = slots[old].take() else {
                continue;
            };
            node.scope = if environment.contains(&old) {
                NodeScope::Environment
            } else {
                NodeScope::LinkInOnly
            };
            node.depends = node.depends.iter().map(|d| position[*d]).collect();
            for edge in &mut node.link_in {
                edge.target = position[edge.target];
            }
            nodes.push(node);
        }

        Ok(ResolvedGraph {
            nodes,
        })
    }
}

/// Name for a declaration that has none: last segment of its offset or URI.
fn fallback_name(identity: &SourceIdentity) -> String {
    identity
        .offset()
        .and_then(|offset| offset.rsplit('/').next())
        .or_else(|| identity.uri().rsplit(['/', ':']).find(|s| !s.is_empty()))
        .unwrap_or("package")
        .to_string()
}
