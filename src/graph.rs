//! Cycle detection over parent pointers and dependency edges.
//!
//! Both checks are iterative and work on any ordered key, so the same code
//! runs on client temporary ids and on persistent ids.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Find a cycle in a parent-pointer graph.
///
/// Parents that are not keys of `parents` are treated as external and end the
/// walk. Returns the nodes on the first cycle found, starting from the node
/// whose parent closes the loop.
pub fn find_parent_cycle<K: Ord + Clone>(parents: &BTreeMap<K, Option<K>>) -> Option<Vec<K>> {
    let mut done: BTreeSet<&K> = BTreeSet::new();

    for start in parents.keys() {
        if done.contains(start) {
            continue;
        }

        let mut path: Vec<&K> = Vec::new();
        let mut on_path: BTreeMap<&K, usize> = BTreeMap::new();
        let mut current = start;

        loop {
            on_path.insert(current, path.len());
            path.push(current);

            let Some(Some(parent)) = parents.get(current) else {
                break;
            };
            let Some((parent_key, _)) = parents.get_key_value(parent) else {
                break;
            };
            if done.contains(parent_key) {
                break;
            }
            if let Some(&index) = on_path.get(parent_key) {
                return Some(path[index..].iter().map(|k| (*k).clone()).collect());
            }
            current = parent_key;
        }

        done.extend(path);
    }

    None
}

/// Find a cycle in a directed graph given as adjacency lists.
///
/// Edges to nodes that are not keys of `edges` are ignored. Uses Kahn's
/// algorithm to discard every node that is not on or behind a cycle, then
/// walks the remainder until a node repeats.
pub fn find_dependency_cycle<K: Ord + Clone>(edges: &BTreeMap<K, Vec<K>>) -> Option<Vec<K>> {
    let mut in_degree: BTreeMap<&K, usize> = edges.keys().map(|k| (k, 0)).collect();
    for targets in edges.values() {
        for target in targets {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<&K> = in_degree
        .iter()
        .filter(|&(_, degree)| *degree == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut removed: BTreeSet<&K> = BTreeSet::new();

    while let Some(node) = queue.pop_front() {
        removed.insert(node);
        for target in &edges[node] {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    // Every remaining node has an incoming edge from another remaining node,
    // so walking backwards along those edges always reaches a repeat.
    let remaining: BTreeSet<&K> = in_degree
        .keys()
        .filter(|k| !removed.contains(*k))
        .copied()
        .collect();
    let start = *remaining.iter().next()?;

    let mut incoming: BTreeMap<&K, Vec<&K>> = BTreeMap::new();
    for (source, targets) in edges {
        if !remaining.contains(source) {
            continue;
        }
        for target in targets {
            if let Some((key, _)) = edges.get_key_value(target) {
                if remaining.contains(key) {
                    incoming.entry(key).or_default().push(source);
                }
            }
        }
    }

    let mut path: Vec<&K> = Vec::new();
    let mut on_path: BTreeMap<&K, usize> = BTreeMap::new();
    let mut current = start;
    loop {
        if let Some(&index) = on_path.get(current) {
            // The path was built against edge direction.
            return Some(path[index..].iter().rev().map(|k| (*k).clone()).collect());
        }
        on_path.insert(current, path.len());
        path.push(current);
        current = *incoming.get(current)?.first()?;
    }
}
