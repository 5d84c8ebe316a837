//! Workflow definitions.
//!
//! These types describe what a workflow looks like before validation. They
//! can be serialised to/from JSON so a definition can be checked offline
//! with `sail-planner validate`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single task in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow; also the task's output key.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge: `to` depends on `from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete, not yet validated workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        Self {
            name: name.into(),
            nodes,
            edges,
        }
    }

    /// Build from node ids and `(from, to)` pairs.
    pub fn from_pairs(name: impl Into<String>, nodes: &[&str], edges: &[(&str, &str)]) -> Self {
        Self::new(
            name,
            nodes.iter().map(|id| NodeDefinition::new(*id)).collect(),
            edges.iter().map(|(from, to)| Edge::new(*from, *to)).collect(),
        )
    }

    /// Build from `(node, predecessors)` entries, declaring nodes in order.
    pub fn from_dependencies<'a, I>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for (id, deps) in entries {
            nodes.push(NodeDefinition::new(id));
            edges.extend(deps.into_iter().map(|dep| Edge::new(dep, id)));
        }
        Self::new(name, nodes, edges)
    }

    /// The built-in sailing go/no-go workflow.
    pub fn sailing() -> Self {
        Self::from_pairs("sailing", &nodes::sailing::NODES, &nodes::sailing::EDGES)
    }
}
