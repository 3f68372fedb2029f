//! Dependency acyclicity check
//!
//! Pure topological check over `dependsOn` references. The DAG builder later
//! re-detects cycles with petgraph; reaching that point with a cycle is an
//! internal error, because this check runs first.

use super::rules::each_metadata;
use crate::model::ProjectState;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Find one `dependsOn` cycle, as the list of identity paths along it.
/// Returns `None` when the dependency graph is acyclic.
pub fn find_dependency_cycle(desired: &ProjectState) -> Option<Vec<String>> {
    // Adjacency over identity paths. Unresolved references are reported
    // separately and simply absent here.
    let metadata = each_metadata(desired);
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for (path, meta) in &metadata {
        let targets = meta
            .depends_on
            .iter()
            .filter_map(|r| desired.resolve_ref(r))
            .map(|identity| identity.to_string())
            .collect();
        adjacency.insert(path.clone(), targets);
    }

    let mut marks: HashMap<&str, Mark> = adjacency
        .keys()
        .map(|k| (k.as_str(), Mark::Unvisited))
        .collect();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node).copied().unwrap_or(Mark::Done) {
            Mark::Done => return None,
            Mark::InProgress => {
                // Close the loop from the first occurrence of `node`.
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            Mark::Unvisited => {}
        }

        marks.insert(node, Mark::InProgress);
        stack.push(node);
        if let Some(targets) = adjacency.get(node) {
            for target in targets {
                if let Some(cycle) = visit(target, adjacency, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    for key in adjacency.keys() {
        if marks.get(key.as_str()) == Some(&Mark::Unvisited) {
            if let Some(cycle) = visit(key, &adjacency, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}
