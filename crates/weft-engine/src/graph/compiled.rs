use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use weft_core::config::EngineConfig;
use weft_core::error::{Result, WeftError};

use super::node::NodeKind;
use super::GraphDefinition;

/// How edge selection treats the two under-specified cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgePolicy {
    /// Reject graphs where a non-condition node has several outgoing edges,
    /// or a condition node has several edges for one branch.
    pub strict_edges: bool,
    /// Fail the run when a condition node has no edge for its result.
    pub fail_on_missing_branch: bool,
}

impl From<&EngineConfig> for EdgePolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            strict_edges: config.strict_edges,
            fail_on_missing_branch: config.fail_on_missing_branch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: String,
    pub kind: NodeKind,
}

/// A validated graph ready to run.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub id: String,
    pub name: String,
    nodes: Vec<CompiledNode>,
    /// (handle, target index) per node, in declaration order.
    outgoing: Vec<Vec<(Option<String>, usize)>>,
    entry: usize,
    policy: EdgePolicy,
}

impl CompiledGraph {
    pub fn compile(def: &GraphDefinition, policy: EdgePolicy) -> Result<Self> {
        let mut index = HashMap::new();
        let mut nodes = Vec::with_capacity(def.nodes.len());
        for node in &def.nodes {
            if index.insert(node.id.clone(), nodes.len()).is_some() {
                return Err(WeftError::InvalidGraph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            nodes.push(CompiledNode {
                id: node.id.clone(),
                kind: NodeKind::compile(node)?,
            });
        }

        let mut outgoing = vec![Vec::new(); nodes.len()];
        for edge in &def.edges {
            let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target))
            else {
                return Err(WeftError::InvalidGraph(format!(
                    "edge '{}' references unknown node ({} -> {})",
                    edge.id, edge.source, edge.target
                )));
            };
            outgoing[from].push((edge.handle.clone(), to));
        }

        if policy.strict_edges {
            check_unambiguous(&nodes, &outgoing)?;
        }

        let entry = nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::Start))
            .or_else(|| {
                nodes
                    .iter()
                    .position(|n| matches!(n.kind, NodeKind::ModelCall(_)))
            })
            .ok_or(WeftError::NoEntryNode)?;

        debug!(
            graph_id = %def.id,
            nodes = nodes.len(),
            edges = def.edges.len(),
            entry = %nodes[entry].id,
            "Graph compiled"
        );

        Ok(Self {
            id: def.id.clone(),
            name: def.name.clone(),
            nodes,
            outgoing,
            entry,
            policy,
        })
    }

    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn node(&self, index: usize) -> &CompiledNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[CompiledNode] {
        &self.nodes
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.iter().map(Vec::len).sum()
    }

    /// Pick the node that follows `index` given its result.
    /// `None` means the run ends here.
    pub fn next(&self, index: usize, output: &Value) -> Result<Option<usize>> {
        let edges = &self.outgoing[index];
        if edges.is_empty() {
            return Ok(None);
        }

        let node = &self.nodes[index];
        if !matches!(node.kind, NodeKind::Condition(_)) {
            return Ok(Some(edges[0].1));
        }

        let branch = if output.as_bool() == Some(true) {
            "true"
        } else {
            "false"
        };
        match edges.iter().find(|(handle, _)| handle.as_deref() == Some(branch)) {
            Some((_, target)) => Ok(Some(*target)),
            None if self.policy.fail_on_missing_branch => Err(WeftError::MissingBranch {
                node: node.id.clone(),
                branch: branch.to_string(),
            }),
            None => {
                debug!(node_id = %node.id, branch, "No edge for condition branch, ending run");
                Ok(None)
            }
        }
    }
}

fn check_unambiguous(
    nodes: &[CompiledNode],
    outgoing: &[Vec<(Option<String>, usize)>],
) -> Result<()> {
    for (node, edges) in nodes.iter().zip(outgoing) {
        let ambiguous = if matches!(node.kind, NodeKind::Condition(_)) {
            let mut seen = HashSet::new();
            !edges.iter().all(|(handle, _)| seen.insert(handle.as_deref()))
        } else {
            edges.len() > 1
        };
        if ambiguous {
            return Err(WeftError::AmbiguousGraph {
                node: node.id.clone(),
                count: edges.len(),
            });
        }
    }
    Ok(())
}
