//! Operation DAG
//!
//! Builds the dependency graph over diff operations and levels it by longest
//! path. Edge sources, in precedence order: explicit `dependsOn`, implicit
//! kind tiers (reversed for deletes), and identity references (user scopes).
//! The validator has already rejected cycles; one surviving to this point is
//! an internal error, not a user error.

use crate::diff::{Operation, OperationType, ResourcePayload};
use crate::model::ResourceKind;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DagError {
    #[error("internal: dependency cycle surfaced at plan time involving {0}")]
    Cycle(String),
}

/// The levelled graph: per-operation dependency indices and stage levels,
/// indexed parallel to the input operations.
#[derive(Debug, Clone)]
pub(super) struct DagLayout {
    /// Direct dependencies (indices into the operation slice).
    pub dependencies: Vec<Vec<usize>>,
    /// Longest-path level; operations sharing a level form one stage.
    pub levels: Vec<usize>,
}

/// Build and level the DAG for a set of mutation operations.
pub(super) fn build_layout(operations: &[Operation]) -> Result<DagLayout, DagError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(operations.len(), 0);
    let nodes: Vec<NodeIndex> = (0..operations.len()).map(|i| graph.add_node(i)).collect();

    // Index desired-side resources by (kind, metadata name) for explicit
    // dependsOn resolution, and cluster ops by cluster name for scope edges.
    let mut by_meta_name: HashMap<(ResourceKind, String), usize> = HashMap::new();
    let mut cluster_ops: HashMap<String, usize> = HashMap::new();
    for (idx, op) in operations.iter().enumerate() {
        if let Some(name) = desired_metadata_name(op) {
            by_meta_name.insert((op.kind(), name.to_string()), idx);
        }
        if op.kind() == ResourceKind::Cluster
            && matches!(op.op_type, OperationType::Create | OperationType::Update)
        {
            if let ResourceIdentityName::Named(name) = identity_name(op) {
                cluster_ops.insert(name, idx);
            }
        }
    }

    let mut add_edge = |graph: &mut DiGraph<usize, ()>, from: usize, to: usize| {
        if from != to && graph.find_edge(nodes[from], nodes[to]).is_none() {
            graph.add_edge(nodes[from], nodes[to], ());
        }
    };

    // 1. Explicit dependsOn on the desired resource.
    for (idx, op) in operations.iter().enumerate() {
        for reference in op.desired_depends_on() {
            if let Some(&dep) = by_meta_name.get(&(reference.kind, reference.name.clone())) {
                add_edge(&mut graph, dep, idx);
            }
        }
    }

    // 2. Implicit kind ordering between consecutive non-empty tiers,
    //    separately for the forward (create/update) and reverse (delete)
    //    classes.
    let mut forward_tiers: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    let mut delete_tiers: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (idx, op) in operations.iter().enumerate() {
        let tier = op.kind().create_tier();
        match op.op_type {
            OperationType::Create | OperationType::Update => {
                forward_tiers.entry(tier).or_default().push(idx);
            }
            OperationType::Delete => {
                // Reverse tier so dependents are removed before what they
                // depend on.
                delete_tiers.entry(u8::MAX - tier).or_default().push(idx);
            }
            OperationType::NoChange => {}
        }
    }
    for tiers in [&forward_tiers, &delete_tiers] {
        let ordered: Vec<&Vec<usize>> = tiers.values().collect();
        for pair in ordered.windows(2) {
            for &from in pair[0] {
                for &to in pair[1] {
                    add_edge(&mut graph, from, to);
                }
            }
        }
    }

    // 3. Identity references: a user scoped to cluster X follows X's
    //    create/update.
    for (idx, op) in operations.iter().enumerate() {
        for cluster in op.referenced_clusters() {
            if let Some(&dep) = cluster_ops.get(&cluster) {
                add_edge(&mut graph, dep, idx);
            }
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        let op = &operations[graph[cycle.node_id()]];
        DagError::Cycle(op.identity.to_string())
    })?;

    // Longest-path leveling over the topological order.
    let mut levels = vec![0usize; operations.len()];
    for node in order {
        let op_idx = graph[node];
        let level = graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .map(|dep| levels[graph[dep]] + 1)
            .max()
            .unwrap_or(0);
        levels[op_idx] = level;
    }

    let dependencies = (0..operations.len())
        .map(|idx| {
            let mut deps: Vec<usize> = graph
                .neighbors_directed(nodes[idx], petgraph::Direction::Incoming)
                .map(|dep| graph[dep])
                .collect();
            deps.sort_unstable();
            deps
        })
        .collect();

    Ok(DagLayout {
        dependencies,
        levels,
    })
}

enum ResourceIdentityName {
    Named(String),
    Other,
}

fn identity_name(op: &Operation) -> ResourceIdentityName {
    match &op.identity {
        crate::model::ResourceIdentity::Cluster { name } => {
            ResourceIdentityName::Named(name.clone())
        }
        _ => ResourceIdentityName::Other,
    }
}

/// Metadata name on the desired side, for `dependsOn` resolution.
fn desired_metadata_name(op: &Operation) -> Option<&str> {
    match &op.payload {
        ResourcePayload::Project { desired, .. } => desired.as_ref().map(|r| r.metadata.name.as_str()),
        ResourcePayload::Cluster { desired, .. } => desired.as_ref().map(|r| r.metadata.name.as_str()),
        ResourcePayload::DatabaseUser { desired, .. } => {
            desired.as_ref().map(|r| r.metadata.name.as_str())
        }
        ResourcePayload::DatabaseRole { desired, .. } => {
            desired.as_ref().map(|r| r.metadata.name.as_str())
        }
        ResourcePayload::NetworkAccess { desired, .. } => {
            desired.as_ref().map(|r| r.metadata.name.as_str())
        }
    }
}
