//! Fleet transport: copy a directory to, and run commands on, every node
//! matched by a [`NodeSelector`].

mod command;
mod pdsh;

pub use command::{RemoteCommand, is_valid_env_var, shell_quote};
pub use pdsh::{FanoutOutput, PdshTransport, parse_fanout_output};

use std::path::Path;

use serde::Serialize;

use crate::error::{ExecError, TransportError};
use crate::types::{Credential, NodeSelector};

/// Broadcast primitives over a fleet.
///
/// Both calls block until every node has finished, and fail if any node
/// failed. The returned or attached [`FleetReport`] carries per-node detail.
pub trait FleetTransport: Send + Sync {
    /// Recursively copy `local` to `remote` on every node, creating
    /// `remote`'s parent directories first.
    fn copy(&self, local: &Path, remote: &Path, nodes: &NodeSelector) -> Result<FleetReport, TransportError>;

    /// Run `command` on every node, as root via `sudo` when a credential is given.
    fn exec(
        &self,
        command: &RemoteCommand,
        nodes: &NodeSelector,
        credential: Option<&Credential>,
    ) -> Result<FleetReport, ExecError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    Succeeded,
    Failed { code: Option<i32> },
    Unreachable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub node: String,
    #[serde(flatten)]
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
}

impl NodeOutcome {
    pub fn succeeded(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: NodeStatus::Succeeded,
            output: Vec::new(),
        }
    }

    pub fn failed(node: impl Into<String>, code: Option<i32>) -> Self {
        Self {
            node: node.into(),
            status: NodeStatus::Failed { code },
            output: Vec::new(),
        }
    }

    pub fn unreachable(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: NodeStatus::Unreachable {
                reason: reason.into(),
            },
            output: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == NodeStatus::Succeeded
    }
}

/// Per-node results of one fleet operation, ordered by node name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FleetReport {
    nodes: Vec<NodeOutcome>,
}

impl FleetReport {
    pub fn new(mut nodes: Vec<NodeOutcome>) -> Self {
        nodes.sort_by(|a, b| a.node.cmp(&b.node));
        Self { nodes }
    }

    pub fn nodes(&self) -> &[NodeOutcome] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.nodes.iter().all(NodeOutcome::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.nodes.iter().filter(|n| !n.is_success())
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failed().map(|n| n.node.clone()).collect()
    }

    pub fn succeeded_names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.is_success())
            .map(|n| n.node.clone())
            .collect()
    }

    pub fn get(&self, node: &str) -> Option<&NodeOutcome> {
        self.nodes.iter().find(|n| n.node == node)
    }
}
