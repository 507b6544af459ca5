//! Ordered deletion of tasks from a self-referential tree.
//!
//! The `parent_id` foreign key has no cascade, so a task can only be deleted
//! once nothing points at it. Deletion repeatedly peels the candidates that no
//! other remaining candidate names as parent.

use crate::db::{deps, tasks};
use crate::error::{ReconcileError, ReconcileResult};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Deletion batches in execution order. Every task in a batch is a leaf with
/// respect to the candidates that remain after the earlier batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    pub batches: Vec<Vec<i64>>,
}

impl DeletionPlan {
    /// Number of tasks the plan deletes.
    pub fn len(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Order `candidates` for deletion by leaf-peeling.
///
/// `parents` maps task id to parent id; candidates missing from it have no
/// parent. On a cycle, returns the candidates that could not be peeled.
pub fn plan_deletions(
    parents: &BTreeMap<i64, Option<i64>>,
    candidates: &BTreeSet<i64>,
) -> Result<DeletionPlan, Vec<i64>> {
    let parent_of = |id: &i64| {
        parents
            .get(id)
            .copied()
            .flatten()
            .filter(|parent| candidates.contains(parent))
    };

    // Number of candidate children still waiting on each candidate.
    let mut waiting: BTreeMap<i64, usize> = candidates.iter().map(|id| (*id, 0)).collect();
    for id in candidates {
        if let Some(count) = parent_of(id).and_then(|parent| waiting.get_mut(&parent)) {
            *count += 1;
        }
    }

    let mut plan = DeletionPlan::default();
    let mut batch: Vec<i64> = waiting
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut peeled = 0;

    while !batch.is_empty() {
        peeled += batch.len();
        let mut next = Vec::new();
        for id in &batch {
            if let Some(parent) = parent_of(id) {
                if let Some(count) = waiting.get_mut(&parent) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(parent);
                    }
                }
            }
        }
        next.sort_unstable();
        plan.batches.push(std::mem::replace(&mut batch, next));
    }

    if peeled < candidates.len() {
        let peeled: BTreeSet<i64> = plan.batches.iter().flatten().copied().collect();
        return Err(candidates.difference(&peeled).copied().collect());
    }

    Ok(plan)
}

/// What executing a deletion did to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub deleted: usize,
    /// Surviving tasks whose parent was deleted and whose parent link was
    /// cleared.
    pub detached: Vec<i64>,
}

/// Delete `candidates` from storage.
///
/// Survivors whose parent is a candidate are detached first. Each batch has
/// its dependency edges cleared in both directions before its rows go.
pub(crate) fn delete_tasks(
    conn: &Connection,
    parents: &BTreeMap<i64, Option<i64>>,
    candidates: &BTreeSet<i64>,
) -> ReconcileResult<DeletionReport> {
    let plan = plan_deletions(parents, candidates).map_err(ReconcileError::deletion_cycle)?;
    let mut report = DeletionReport::default();

    for (&id, parent) in parents {
        if candidates.contains(&id) {
            continue;
        }
        if parent.is_some_and(|parent| candidates.contains(&parent)) {
            tasks::set_parent(conn, id, None)?;
            report.detached.push(id);
        }
    }

    for (round, batch) in plan.batches.iter().enumerate() {
        debug!(round, batch = ?batch, "Deleting task batch");
        for &id in batch {
            deps::clear_edges(conn, id)?;
            tasks::delete_task(conn, id)?;
        }
        report.deleted += batch.len();
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parents(pairs: &[(i64, Option<i64>)]) -> BTreeMap<i64, Option<i64>> {
        pairs.iter().copied().collect()
    }

    fn set(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_chain_deletes_leaf_first() {
        // 3 -> 2 -> 1
        let graph = parents(&[(1, None), (2, Some(1)), (3, Some(2))]);
        let plan = plan_deletions(&graph, &set(&[1, 2, 3])).unwrap();
        assert_eq!(plan.batches, vec![vec![3], vec![2], vec![1]]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_siblings_share_a_batch() {
        let graph = parents(&[(1, None), (2, Some(1)), (3, Some(1)), (4, None)]);
        let plan = plan_deletions(&graph, &set(&[1, 2, 3, 4])).unwrap();
        assert_eq!(plan.batches, vec![vec![2, 3, 4], vec![1]]);
    }

    #[test]
    fn test_surviving_children_do_not_block() {
        // 2 survives under 1; only candidates count.
        let graph = parents(&[(1, None), (2, Some(1))]);
        let plan = plan_deletions(&graph, &set(&[1])).unwrap();
        assert_eq!(plan.batches, vec![vec![1]]);
    }

    #[test]
    fn test_cycle_is_reported() {
        // 5 <-> 6 cycle with 7 hanging below 6
        let graph = parents(&[(5, Some(6)), (6, Some(5)), (7, Some(6))]);
        let err = plan_deletions(&graph, &set(&[5, 6, 7])).unwrap_err();
        assert_eq!(err, vec![5, 6]);
    }

    #[test]
    fn test_long_chain_peels_one_per_batch() {
        let depth = 20_000;
        let graph: BTreeMap<i64, Option<i64>> =
            (0..depth).map(|i| (i, (i > 0).then(|| i - 1))).collect();
        let candidates: BTreeSet<i64> = (0..depth).collect();

        let plan = plan_deletions(&graph, &candidates).unwrap();
        assert_eq!(plan.batches.len(), depth as usize);
        assert_eq!(plan.batches.first(), Some(&vec![depth - 1]));
        assert_eq!(plan.batches.last(), Some(&vec![0]));
    }

    #[test]
    fn test_empty_candidates() {
        let plan = plan_deletions(&BTreeMap::new(), &BTreeSet::new()).unwrap();
        assert!(plan.is_empty());
    }

    proptest! {
        /// On any acyclic forest the plan deletes every candidate exactly once
        /// and never deletes a task before a candidate child of it.
        #[test]
        fn prop_plan_respects_parent_order(
            raw in prop::collection::vec((any::<u8>(), any::<bool>()), 1..60)
        ) {
            let graph: BTreeMap<i64, Option<i64>> = raw
                .iter()
                .enumerate()
                .map(|(i, (r, _))| {
                    let parent = if i == 0 || r % 5 == 0 { None } else { Some((*r as usize % i) as i64) };
                    (i as i64, parent)
                })
                .collect();
            let candidates: BTreeSet<i64> = raw
                .iter()
                .enumerate()
                .filter(|(_, (_, pick))| *pick)
                .map(|(i, _)| i as i64)
                .collect();

            let plan = plan_deletions(&graph, &candidates).unwrap();
            prop_assert_eq!(plan.len(), candidates.len());

            let mut deleted = BTreeSet::new();
            for batch in &plan.batches {
                for id in batch {
                    // Candidate children go in an earlier batch.
                    for (child, parent) in &graph {
                        if *parent == Some(*id) && candidates.contains(child) {
                            prop_assert!(deleted.contains(child));
                        }
                    }
                }
                deleted.extend(batch.iter().copied());
            }
            prop_assert_eq!(deleted, candidates);
        }

        /// Closing any chain of candidates into a loop makes planning fail.
        #[test]
        fn prop_candidate_cycle_fails(len in 1i64..30) {
            let mut graph: BTreeMap<i64, Option<i64>> =
                (0..len).map(|i| (i, if i == 0 { None } else { Some(i - 1) })).collect();
            graph.insert(0, Some(len - 1));
            let candidates: BTreeSet<i64> = (0..len).collect();
            let err = plan_deletions(&graph, &candidates).unwrap_err();
            prop_assert_eq!(err.len() as i64, len);
        }
    }
}
