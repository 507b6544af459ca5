//! Two-pass materialization of validated records.
//!
//! Pass 1 writes scalar fields and binds every record to a persistent id.
//! Pass 2 resolves parent links and dependency edges through the identity
//! map, which is only complete once pass 1 has finished.

use super::differ::TreeDiff;
use super::edges::write_dependencies;
use super::identity::{DanglingReference, IdentityMap, LinkKind};
use super::validate::ValidatedTask;
use crate::db::{deps, tasks};
use crate::error::ReconcileResult;
use crate::types::Task;
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Tasks and edges of a project as stored before the call.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoredState {
    pub tasks: BTreeMap<i64, Task>,
    pub dependencies: BTreeMap<i64, Vec<i64>>,
}

impl StoredState {
    pub fn load(conn: &Connection, project_id: i64) -> ReconcileResult<Self> {
        let tasks = tasks::project_tasks(conn, project_id)?
            .into_iter()
            .map(|task| (task.id, task))
            .collect();
        let dependencies = deps::dependency_map(conn, project_id)?;
        Ok(Self {
            tasks,
            dependencies,
        })
    }

    pub fn ids(&self) -> BTreeSet<i64> {
        self.tasks.keys().copied().collect()
    }

    pub fn parents(&self) -> BTreeMap<i64, Option<i64>> {
        self.tasks
            .iter()
            .map(|(id, task)| (*id, task.parent_id))
            .collect()
    }

    fn parent_of(&self, id: i64) -> Option<i64> {
        self.tasks.get(&id).and_then(|task| task.parent_id)
    }

    fn dependencies_of(&self, id: i64) -> &[i64] {
        self.dependencies.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Materialized {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub dangling: Vec<DanglingReference>,
}

pub(crate) fn materialize(
    conn: &Connection,
    project_id: i64,
    records: &[ValidatedTask],
    diff: &TreeDiff,
    stored: &StoredState,
    now: i64,
) -> ReconcileResult<Materialized> {
    let matched: BTreeMap<usize, i64> = diff.update.iter().copied().collect();
    let mut ids = IdentityMap::new();
    let mut assigned = Vec::with_capacity(records.len());
    let mut changed = vec![false; records.len()];

    // Pass 1: fields.
    for (index, record) in records.iter().enumerate() {
        let id = match matched.get(&index) {
            Some(&id) => {
                let same = stored
                    .tasks
                    .get(&id)
                    .is_some_and(|task| task.fields() == record.fields);
                if !same {
                    tasks::update_task_fields(conn, id, &record.fields, now)?;
                    changed[index] = true;
                }
                id
            }
            None => tasks::insert_task(conn, project_id, &record.fields, now)?,
        };
        ids.bind(&record.temporary_id, id);
        assigned.push(id);
    }
    debug!(bound = ids.len(), "Pass 1 complete");

    // Pass 2: links.
    for (index, record) in records.iter().enumerate() {
        let id = assigned[index];
        let is_new = !matched.contains_key(&index);

        let parent = record
            .parent_id
            .as_deref()
            .and_then(|parent| ids.resolve(&record.temporary_id, parent, LinkKind::Parent));
        let stored_parent = if is_new { None } else { stored.parent_of(id) };
        if parent != stored_parent {
            tasks::set_parent(conn, id, parent)?;
            changed[index] = true;
        }

        let stored_deps = if is_new { &[][..] } else { stored.dependencies_of(id) };
        if write_dependencies(conn, &mut ids, id, record, stored_deps)? {
            changed[index] = true;
        }

        if !is_new && changed[index] {
            tasks::touch(conn, id, now)?;
        }
    }

    let created = diff.create.len();
    let updated = diff
        .update
        .iter()
        .filter(|(index, _)| changed[*index])
        .count();

    Ok(Materialized {
        created,
        updated,
        unchanged: diff.update.len() - updated,
        dangling: ids.into_dangling(),
    })
}
