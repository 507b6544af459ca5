//! Diff an incoming payload against the tasks stored for a project.

use super::validate::ValidatedTask;
use std::collections::BTreeSet;

/// The three disjoint outcomes for a reconciliation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    /// Stored task ids not claimed by any record.
    pub delete: BTreeSet<i64>,
    /// `(record index, stored id)` for records matching a stored task.
    pub update: Vec<(usize, i64)>,
    /// Indexes of records that become new tasks.
    pub create: Vec<usize>,
}

impl TreeDiff {
    /// Match records to stored tasks by persistent id only.
    ///
    /// A record whose persistent id is not stored in this project (absent,
    /// deleted, or owned by another project) is treated as new.
    pub fn compute(stored: &BTreeSet<i64>, records: &[ValidatedTask]) -> Self {
        let mut diff = TreeDiff::default();
        let mut claimed = BTreeSet::new();

        for (index, record) in records.iter().enumerate() {
            match record.persistent_id {
                Some(id) if stored.contains(&id) => {
                    claimed.insert(id);
                    diff.update.push((index, id));
                }
                _ => diff.create.push(index),
            }
        }

        diff.delete = stored.difference(&claimed).copied().collect();
        diff
    }
}
