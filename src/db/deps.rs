//! Dependency edges between tasks.
//!
//! An edge `(task_id, depends_on_task_id)` means `task_id` cannot start before
//! `depends_on_task_id`. The schema rejects self-edges and edges that cross a
//! project boundary.

use super::Database;
use anyhow::Result;
use rusqlite::{Connection, params};
use std::collections::{BTreeMap, BTreeSet};

/// Replace the outgoing dependency set of a task. Duplicate targets collapse
/// to one edge.
pub(crate) fn replace_dependencies(conn: &Connection, task_id: i64, targets: &[i64]) -> Result<()> {
    conn.execute(
        "DELETE FROM task_dependencies WHERE task_id = ?1",
        params![task_id],
    )?;

    let targets: BTreeSet<i64> = targets.iter().copied().collect();
    let mut stmt = conn
        .prepare("INSERT INTO task_dependencies (task_id, depends_on_task_id) VALUES (?1, ?2)")?;
    for target in targets {
        stmt.execute(params![task_id, target])?;
    }
    Ok(())
}

/// Remove every edge touching a task, in either direction. Returns the number
/// of edges removed.
pub(crate) fn clear_edges(conn: &Connection, task_id: i64) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM task_dependencies WHERE task_id = ?1 OR depends_on_task_id = ?1",
        params![task_id],
    )?;
    Ok(removed)
}

fn query_ids(conn: &Connection, sql: &str, id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

pub(crate) fn dependencies_of(conn: &Connection, task_id: i64) -> Result<Vec<i64>> {
    query_ids(
        conn,
        "SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ?1
         ORDER BY depends_on_task_id",
        task_id,
    )
}

pub(crate) fn dependents_of(conn: &Connection, task_id: i64) -> Result<Vec<i64>> {
    query_ids(
        conn,
        "SELECT task_id FROM task_dependencies WHERE depends_on_task_id = ?1 ORDER BY task_id",
        task_id,
    )
}

fn edge_map(conn: &Connection, sql: &str, project_id: i64) -> Result<BTreeMap<i64, Vec<i64>>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![project_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;

    let mut map: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for (key, value) in rows {
        map.entry(key).or_default().push(value);
    }
    Ok(map)
}

/// Outgoing edges of every task in a project, keyed by task, targets sorted.
pub(crate) fn dependency_map(conn: &Connection, project_id: i64) -> Result<BTreeMap<i64, Vec<i64>>> {
    edge_map(
        conn,
        "SELECT d.task_id, d.depends_on_task_id
         FROM task_dependencies d
         INNER JOIN tasks t ON t.id = d.task_id
         WHERE t.project_id = ?1
         ORDER BY d.task_id, d.depends_on_task_id",
        project_id,
    )
}

/// Incoming edges of every task in a project, keyed by target, sources sorted.
pub(crate) fn dependent_map(conn: &Connection, project_id: i64) -> Result<BTreeMap<i64, Vec<i64>>> {
    edge_map(
        conn,
        "SELECT d.depends_on_task_id, d.task_id
         FROM task_dependencies d
         INNER JOIN tasks t ON t.id = d.depends_on_task_id
         WHERE t.project_id = ?1
         ORDER BY d.depends_on_task_id, d.task_id",
        project_id,
    )
}

impl Database {
    /// Get the tasks a given task depends on.
    pub fn get_dependencies(&self, task_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| dependencies_of(conn, task_id))
    }

    /// Get the tasks that depend on a given task.
    pub fn get_dependents(&self, task_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| dependents_of(conn, task_id))
    }
}
