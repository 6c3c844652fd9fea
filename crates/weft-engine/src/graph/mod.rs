//! Workflow graphs.
//!
//! A workflow is a directed graph of typed `Node`s connected by `Edge`s.
//! Documents are compiled into a `CompiledGraph` before anything runs: node
//! types are resolved into the closed `NodeKind` set, templates are parsed,
//! edges are checked and the entry node is chosen.

pub mod compiled;
pub mod edge;
pub mod node;

use std::path::Path;

use serde::{Deserialize, Serialize};

use weft_core::error::Result;

pub use compiled::{CompiledGraph, CompiledNode, EdgePolicy};
pub use edge::Edge;
pub use node::{ModelCallConfig, Node, NodeKind, ToolArg, ToolConfig};

/// A graph document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes,
            edges,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a graph from a JSON file. A missing `id` defaults to the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut graph = Self::from_json(&content)?;
        if graph.id.is_empty() {
            graph.id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let graph = GraphDefinition::from_json(
            r#"{
                "id": "summarize",
                "name": "Summarize",
                "nodes": [
                    {"id": "s", "type": "start"},
                    {"id": "e", "type": "end", "data": {}}
                ],
                "edges": [{"id": "e1", "source": "s", "target": "e"}]
            }"#,
        )
        .unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].target, "e");
    }

    #[test]
    fn test_load_defaults_id_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.json");
        std::fs::write(&path, r#"{"nodes": [{"id": "s", "type": "start"}]}"#).unwrap();
        let graph = GraphDefinition::load(&path).unwrap();
        assert_eq!(graph.id, "triage");
        assert!(graph.edges.is_empty());
    }
}
