use serde::{Deserialize, Serialize};

/// An edge connecting two nodes in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Branch selector for condition nodes: `"true"` or `"false"`.
    #[serde(default, alias = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            handle: None,
        }
    }

    /// Create an edge taken when a condition node yields `branch`.
    pub fn branch(source: impl Into<String>, target: impl Into<String>, branch: bool) -> Self {
        let mut edge = Self::new(source, target);
        edge.handle = Some(branch.to_string());
        edge
    }
}
