//! Static checks and batch planning over a registry.

use std::collections::{HashMap, VecDeque};

use hldflow_utils::error::GraphError;

use crate::registry::StageRegistry;

/// Kahn's algorithm over the dependency edges.
///
/// Returns the stages left with unresolved in-degree, in registration order,
/// as a [`GraphError::Cycle`].
pub(super) fn check_acyclic(registry: &StageRegistry) -> Result<(), GraphError> {
    let names = registry.names();
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|name| (*name, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for descriptor in registry.descriptors() {
        for dependency in &descriptor.dependencies {
            if let Some(count) = in_degree.get_mut(descriptor.name.as_str()) {
                *count += 1;
            }
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(descriptor.name.as_str());
        }
    }

    let mut queue: VecDeque<&str> = names
        .iter()
        .copied()
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();
    let mut visited = 0;

    while let Some(stage) = queue.pop_front() {
        visited += 1;
        for child in dependents.get(stage).into_iter().flatten() {
            if let Some(count) = in_degree.get_mut(child) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(*child);
                }
            }
        }
    }

    if visited == names.len() {
        return Ok(());
    }

    let stages = names
        .into_iter()
        .filter(|name| in_degree.get(name).is_some_and(|count| *count > 0))
        .map(str::to_string)
        .collect();
    Err(GraphError::Cycle { stages })
}

/// Fixed-order traversal needs every dependency registered before its dependent.
pub(super) fn check_registration_order(registry: &StageRegistry) -> Result<(), GraphError> {
    for (position, descriptor) in registry.descriptors().enumerate() {
        for dependency in &descriptor.dependencies {
            if registry.position(dependency).is_none_or(|dep| dep > position) {
                return Err(GraphError::OrderViolation {
                    stage: descriptor.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Split registration order into contiguous runs with no intra-run dependencies.
pub(super) fn partition_batches(registry: &StageRegistry) -> Vec<Vec<String>> {
    let mut batches: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for descriptor in registry.descriptors() {
        let depends_on_current = descriptor
            .dependencies
            .iter()
            .any(|dependency| current.contains(dependency));
        if depends_on_current {
            batches.push(std::mem::take(&mut current));
        }
        current.push(descriptor.name.clone());
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
