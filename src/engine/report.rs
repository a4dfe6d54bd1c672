//! Outcome of one pipeline run.

use crate::core::{FailureStage, NumngError};
use crate::link::Registrations;
use crate::resolver::ResolvedGraph;
use std::fmt;

/// Per-node outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    /// Fetched, built and linked (or not yet past the current stage)
    Ready,
    Failed {
        stage: FailureStage,
        message: String,
    },
    /// Not attempted because a prerequisite failed
    Blocked {
        stage: FailureStage,
        by: String,
    },
}

impl NodeStatus {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    #[must_use]
    pub const fn stage(&self) -> Option<FailureStage> {
        match self {
            Self::Ready => None,
            Self::Failed {
                stage,
                ..
            }
            | Self::Blocked {
                stage,
                ..
            } => Some(*stage),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Failed {
                stage,
                message,
            } => write!(f, "{stage} failed: {message}"),
            Self::Blocked {
                by,
                ..
            } => write!(f, "blocked by {by}"),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub graph: ResolvedGraph,
    /// Parallel to `graph.nodes()`
    pub statuses: Vec<NodeStatus>,
    /// Non-fatal problems ([`NumngError::BuildPermissionDenied`])
    pub warnings: Vec<NumngError>,
    pub registrations: Registrations,
    /// Filesystem changes made while linking
    pub link_changes: usize,
}

impl EngineReport {
    /// Whether every node made it through the pipeline.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.statuses.iter().all(NodeStatus::is_ready)
    }

    /// Aggregate of every failed or blocked node, in graph order.
    ///
    /// The stage is the earliest among the failures, so a fetch failure
    /// outranks build and link failures for the exit code.
    #[must_use]
    pub fn failure(&self) -> Option<NumngError> {
        let stage = self.statuses.iter().filter_map(NodeStatus::stage).min()?;
        let failures = self
            .graph
            .nodes()
            .iter()
            .zip(&self.statuses)
            .filter(|(_, status)| !status.is_ready())
            .map(|(node, status)| (node.key.to_string(), status.to_string()))
            .collect();
        Some(NumngError::SubgraphFailures {
            stage,
            failures,
        })
    }

    /// `Ok(self)` on success, the aggregate failure otherwise.
    pub fn into_result(self) -> Result<Self, NumngError> {
        match self.failure() {
            Some(failure) => Err(failure),
            None => Ok(self),
        }
    }
}
