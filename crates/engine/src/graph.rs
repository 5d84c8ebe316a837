//! DAG validation and the immutable `WorkflowGraph`.
//!
//! Rules enforced by [`WorkflowGraph::build`]:
//! 1. The workflow declares at least one node.
//! 2. Node IDs must be unique within the workflow.
//! 3. Every edge must reference valid node IDs (both `from` and `to`).
//! 4. The directed graph must be acyclic (topological sort must succeed).
//!
//! A built graph is never mutated and is shared read-only across tasks.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{models::Workflow, GraphError};

#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    name: String,
    /// Declaration order.
    nodes: Vec<String>,
    predecessors: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl WorkflowGraph {
    /// Validate the workflow and build its graph.
    ///
    /// # Errors
    /// - [`GraphError::Empty`] if there are no nodes.
    /// - [`GraphError::DuplicateNodeId`] if two nodes share an ID.
    /// - [`GraphError::UnknownNodeReference`] if an edge references a missing node.
    /// - [`GraphError::Cycle`] naming a node on a cycle.
    pub fn build(workflow: &Workflow) -> Result<Self, GraphError> {
        if workflow.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        // -------------------------------------------------------------------
        // 1. Ensure node IDs are unique
        // -------------------------------------------------------------------
        let mut seen_ids: HashSet<&str> = HashSet::new();
        for node in &workflow.nodes {
            if !seen_ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
        }

        // -------------------------------------------------------------------
        // 2. Validate edge endpoints
        // -------------------------------------------------------------------
        for edge in &workflow.edges {
            if !seen_ids.contains(edge.from.as_str()) {
                return Err(GraphError::UnknownNodeReference {
                    node_id: edge.from.clone(),
                    side: "from",
                });
            }
            if !seen_ids.contains(edge.to.as_str()) {
                return Err(GraphError::UnknownNodeReference {
                    node_id: edge.to.clone(),
                    side: "to",
                });
            }
        }

        // -------------------------------------------------------------------
        // 3. Adjacency in both directions; repeated edges collapse.
        // -------------------------------------------------------------------
        let nodes: Vec<String> = workflow.nodes.iter().map(|n| n.id.clone()).collect();
        let mut predecessors: HashMap<String, Vec<String>> =
            nodes.iter().map(|id| (id.clone(), Vec::new())).collect();
        let mut dependents = predecessors.clone();

        let mut seen_edges = HashSet::new();
        for edge in &workflow.edges {
            if !seen_edges.insert((edge.from.as_str(), edge.to.as_str())) {
                continue;
            }
            dependents
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
            predecessors
                .entry(edge.to.clone())
                .or_default()
                .push(edge.from.clone());
        }

        let order = topological_order(&nodes, &predecessors, &dependents)?;

        Ok(Self {
            name: workflow.name.clone(),
            nodes,
            predecessors,
            dependents,
            order,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every node ID in declaration order.
    pub fn all_nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.predecessors.contains_key(node_id)
    }

    /// Nodes `node_id` depends on.
    pub fn predecessors_of(&self, node_id: &str) -> &[String] {
        self.predecessors
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Nodes that depend on `node_id`.
    pub fn dependents_of(&self, node_id: &str) -> &[String] {
        self.dependents
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of predecessors; the join count used by the scheduler.
    pub fn in_degree(&self, node_id: &str) -> usize {
        self.predecessors_of(node_id).len()
    }

    /// Nodes with no predecessors, in declaration order.
    pub fn entry_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|id| self.in_degree(id) == 0)
            .map(String::as_str)
            .collect()
    }

    /// Nodes nothing depends on, in declaration order.
    pub fn terminal_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|id| self.dependents_of(id).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Nodes with more than one predecessor.
    pub fn join_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|id| self.in_degree(id) > 1)
            .map(String::as_str)
            .collect()
    }

    /// A valid execution order.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Every node reachable from `node_id` through dependent edges.
    pub fn descendants_of(&self, node_id: &str) -> Vec<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = self
            .dependents_of(node_id)
            .iter()
            .map(String::as_str)
            .collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            queue.extend(self.dependents_of(id).iter().map(String::as_str));
        }

        out
    }
}

/// Kahn's algorithm, seeded in declaration order so the result is stable.
fn topological_order(
    nodes: &[String],
    predecessors: &HashMap<String, Vec<String>>,
    dependents: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, GraphError> {
    let mut in_degree: HashMap<&str, usize> = nodes
        .iter()
        .map(|id| (id.as_str(), predecessors[id].len()))
        .collect();

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(String::as_str)
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        for neighbour in &dependents[node_id] {
            if let Some(deg) = in_degree.get_mut(neighbour.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour.as_str());
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != nodes.len() {
        let remaining: HashSet<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d > 0)
            .map(|(&id, _)| id)
            .collect();
        return Err(GraphError::Cycle {
            node_id: node_on_cycle(nodes, predecessors, &remaining),
        });
    }

    Ok(sorted)
}

/// Every unsorted node keeps at least one unsorted predecessor, so walking
/// predecessors inside that set must revisit a node; the first revisited
/// node lies on a cycle.
fn node_on_cycle(
    nodes: &[String],
    predecessors: &HashMap<String, Vec<String>>,
    remaining: &HashSet<&str>,
) -> String {
    let Some(mut current) = nodes.iter().map(String::as_str).find(|id| remaining.contains(id)) else {
        return String::new();
    };
    let mut visited: HashSet<&str> = HashSet::new();

    while visited.insert(current) {
        match predecessors[current]
            .iter()
            .map(String::as_str)
            .find(|p| remaining.contains(p))
        {
            Some(next) => current = next,
            None => break,
        }
    }

    current.to_owned()
}
