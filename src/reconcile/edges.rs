//! Dependency graph writer.

use super::identity::{IdentityMap, LinkKind};
use super::validate::ValidatedTask;
use crate::db::deps;
use crate::error::ReconcileResult;
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Resolve a record's dependency list and replace the task's outgoing edges
/// with it. `stored` is the edge set before this call. Returns whether the
/// set changed.
pub(crate) fn write_dependencies(
    conn: &Connection,
    ids: &mut IdentityMap,
    task_id: i64,
    record: &ValidatedTask,
    stored: &[i64],
) -> ReconcileResult<bool> {
    let resolved: BTreeSet<i64> = record
        .dependencies
        .iter()
        .filter_map(|dep| ids.resolve(&record.temporary_id, dep, LinkKind::Dependency))
        .collect();
    let current: BTreeSet<i64> = stored.iter().copied().collect();

    if resolved == current {
        return Ok(false);
    }

    let targets: Vec<i64> = resolved.into_iter().collect();
    deps::replace_dependencies(conn, task_id, &targets)?;
    Ok(true)
}
