//! Dependency graph with cycle detection and a deterministic topological order.
//!
//! Nodes are identified by their insertion index, which is also the order in
//! which the resolver first encountered them. Ties in the topological order are
//! broken by that index so the same input always yields the same order.

use crate::core::NumngError;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Directed graph where an edge `a → b` means "a depends on b".
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node labelled `label` (used in cycle messages) and returns its index.
    pub fn add_node(&mut self, label: impl Into<String>) -> usize {
        self.graph.add_node(label.into()).index()
    }

    /// Records that `from` depends on `to`. Duplicate edges are ignored.
    pub fn add_dependency(&mut self, from: usize, to: usize) {
        let (from, to) = (NodeIndex::new(from), NodeIndex::new(to));
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Fails with [`NumngError::CyclicDependency`] naming the first cycle found.
    pub fn detect_cycles(&self) -> Result<(), NumngError> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|n| (n, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                let chain = cycle.iter().map(|n| self.graph[*n].as_str()).collect::<Vec<_>>().join(" -> ");
                return Err(NumngError::CyclicDependency {
                    chain,
                });
            }
        }
        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.graph.neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Node indices with every dependency before its dependents.
    ///
    /// Among nodes whose dependencies are all placed, the one inserted first
    /// comes first.
    pub fn topological_order(&self) -> Result<Vec<usize>, NumngError> {
        self.detect_cycles()?;

        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors(n).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for parent in self.graph.neighbors_directed(NodeIndex::new(index), Direction::Incoming) {
                let slot = &mut remaining[parent.index()];
                *slot -= 1;
                if *slot == 0 {
                    ready.push(Reverse(parent.index()));
                }
            }
        }
        Ok(order)
    }
}
