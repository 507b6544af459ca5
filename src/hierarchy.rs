//! Nested views over flat hierarchical entities.
//!
//! Project tasks and template tasks share one shape: an id, an optional parent
//! in the same set, and a set of dependency ids in the same set. Everything
//! that turns those flat rows into trees or audits their graphs lives here and
//! is generic over [`Hierarchical`].

use crate::graph::{find_dependency_cycle, find_parent_cycle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// An entity addressed by integer id with a parent link and dependencies.
pub trait Hierarchical {
    /// Entity kind used in log output.
    const KIND: &'static str;

    fn node_id(&self) -> i64;
    fn parent_id(&self) -> Option<i64>;
    fn dependency_ids(&self) -> &[i64];
}

/// An entity with its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub children: Vec<TreeNode<T>>,
}

impl<T> TreeNode<T> {
    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(node.children.iter());
        }
        count
    }
}

// Deep chains would otherwise drop one frame per level.
impl<T> Drop for TreeNode<T> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// A set of trees built from flat rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest<T> {
    pub roots: Vec<TreeNode<T>>,
    /// Ids that no root reaches. Only non-empty when stored parent links are
    /// cyclic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detached: Vec<i64>,
}

impl<T: Hierarchical> Forest<T> {
    /// Group flat rows into trees.
    ///
    /// Roots are rows without a parent or whose parent is not in `items`.
    /// Siblings are ordered by id.
    pub fn build(mut items: Vec<T>) -> Self {
        items.sort_by_key(|item| item.node_id());
        let ids: BTreeSet<i64> = items.iter().map(|item| item.node_id()).collect();

        let mut roots = Vec::new();
        let mut children_of: BTreeMap<i64, Vec<T>> = BTreeMap::new();
        for item in items {
            match item.parent_id() {
                Some(parent) if ids.contains(&parent) => {
                    children_of.entry(parent).or_default().push(item)
                }
                _ => roots.push(item),
            }
        }

        let roots = assemble(roots, &mut children_of);

        // Each child list is taken at most once, so whatever is left was never
        // reached from a root.
        let mut detached: Vec<i64> = children_of
            .into_values()
            .flatten()
            .map(|item| item.node_id())
            .collect();
        detached.sort_unstable();
        if !detached.is_empty() {
            warn!(kind = T::KIND, detached = ?detached, "Rows unreachable from any root");
        }

        Self { roots, detached }
    }

    /// Total number of nodes placed in trees.
    pub fn len(&self) -> usize {
        self.roots.iter().map(TreeNode::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Turn `roots` and their reachable descendants into trees without recursion.
///
/// Rows are first listed in pre-order with their child counts. Walking that
/// list backwards, every node's children sit on top of `built` with the first
/// child uppermost.
fn assemble<T: Hierarchical>(
    roots: Vec<T>,
    children_of: &mut BTreeMap<i64, Vec<T>>,
) -> Vec<TreeNode<T>> {
    let mut order: Vec<(T, usize)> = Vec::new();
    let mut pending: Vec<T> = roots.into_iter().rev().collect();
    while let Some(item) = pending.pop() {
        let children = children_of.remove(&item.node_id()).unwrap_or_default();
        let count = children.len();
        pending.extend(children.into_iter().rev());
        order.push((item, count));
    }

    let mut built: Vec<TreeNode<T>> = Vec::with_capacity(order.len());
    while let Some((item, count)) = order.pop() {
        let mut children = built.split_off(built.len().saturating_sub(count));
        children.reverse();
        built.push(TreeNode { item, children });
    }
    built.reverse();
    built
}

/// Graph integrity findings for a set of hierarchical rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyAudit {
    pub parent_cycle: Option<Vec<i64>>,
    pub dependency_cycle: Option<Vec<i64>>,
    /// `(id, target)` pairs whose target is outside the set.
    pub foreign_dependencies: Vec<(i64, i64)>,
}

impl HierarchyAudit {
    pub fn is_clean(&self) -> bool {
        self.parent_cycle.is_none()
            && self.dependency_cycle.is_none()
            && self.foreign_dependencies.is_empty()
    }
}

/// Check the parent tree and dependency graph of `items` for cycles and for
/// dependencies leaving the set.
pub fn audit<T: Hierarchical>(items: &[T]) -> HierarchyAudit {
    let parents: BTreeMap<i64, Option<i64>> = items
        .iter()
        .map(|item| (item.node_id(), item.parent_id()))
        .collect();
    let edges: BTreeMap<i64, Vec<i64>> = items
        .iter()
        .map(|item| (item.node_id(), item.dependency_ids().to_vec()))
        .collect();

    let foreign_dependencies = items
        .iter()
        .flat_map(|item| {
            item.dependency_ids()
                .iter()
                .filter(|target| !parents.contains_key(target))
                .map(move |target| (item.node_id(), *target))
        })
        .collect();

    HierarchyAudit {
        parent_cycle: find_parent_cycle(&parents),
        dependency_cycle: find_dependency_cycle(&edges),
        foreign_dependencies,
    }
}
