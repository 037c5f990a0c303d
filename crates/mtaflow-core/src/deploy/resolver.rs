//! Next-batch computation over the `deployed-after` graph.
//!
//! Uses `petgraph` to model node dependencies as a directed graph; a
//! topological sort rejects cycles before any batch is produced. A batch is
//! every node that is not completed yet and whose dependencies are all
//! completed, in descriptor order. The computation is stateless and
//! idempotent: the same inputs always give the same batch.

use std::collections::{HashMap, HashSet};

use mtaflow_types::deploy::DeploymentNode;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("node '{node}' is deployed after unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("circular deployed-after dependency involving node '{0}'")]
    CycleDetected(String),

    #[error("node '{0}' is defined more than once")]
    DuplicateNode(String),
}

// ---------------------------------------------------------------------------
// Graph validation
// ---------------------------------------------------------------------------

/// Validate that the nodes form a DAG in which every dependency exists.
pub fn validate_graph(nodes: &[DeploymentNode]) -> Result<(), ResolverError> {
    let mut name_to_idx: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if name_to_idx.insert(node.name.as_str(), i).is_some() {
            return Err(ResolverError::DuplicateNode(node.name.clone()));
        }
    }

    // Edge from dependency -> dependent
    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = nodes.iter().map(|n| graph.add_node(n.name.as_str())).collect();

    for (to_idx, node) in nodes.iter().enumerate() {
        for dep in &node.deployed_after {
            let from_idx = name_to_idx
                .get(dep.as_str())
                .ok_or_else(|| ResolverError::UnknownDependency {
                    node: node.name.clone(),
                    dependency: dep.clone(),
                })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| ResolverError::CycleDetected(graph[cycle.node_id()].to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Batch computation
// ---------------------------------------------------------------------------

/// Nodes ready to be processed given the completed ones.
///
/// An empty batch means nothing is left to do. A graph that still has
/// remaining nodes but no ready one is reported as a cycle.
pub fn next_batch<'a, S: AsRef<str>>(
    nodes: &'a [DeploymentNode],
    completed: &[S],
) -> Result<Vec<&'a DeploymentNode>, ResolverError> {
    validate_graph(nodes)?;

    let completed: HashSet<&str> = completed.iter().map(AsRef::as_ref).collect();
    let remaining: Vec<&DeploymentNode> = nodes
        .iter()
        .filter(|n| !completed.contains(n.name.as_str()))
        .collect();

    let batch: Vec<&DeploymentNode> = remaining
        .iter()
        .copied()
        .filter(|n| n.deployed_after.iter().all(|dep| completed.contains(dep.as_str())))
        .collect();

    if batch.is_empty() {
        if let Some(stuck) = remaining.first() {
            return Err(ResolverError::CycleDetected(stuck.name.clone()));
        }
    }
    Ok(batch)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
