//! Task rows: parsing, field writes, and read views.

use super::{Database, deps, from_ms};
use crate::hierarchy::{Forest, Hierarchical, HierarchyAudit, audit};
use crate::types::{Task, TaskStatus, TaskView};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

const TASK_COLUMNS: &str = "id, project_id, parent_id, name, description, status, start_at, \
                            duration_secs, assignee_id, created_at, updated_at";

/// Scalar task fields, everything except relational links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub start_date: DateTime<Utc>,
    /// Duration in seconds.
    pub duration: i64,
    pub assignee_id: Option<i64>,
}

impl Task {
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            name: self.name.clone(),
            description: self.description.clone(),
            status: self.status,
            start_date: self.start_date,
            duration: self.duration,
            assignee_id: self.assignee_id,
        }
    }
}

impl Hierarchical for TaskView {
    const KIND: &'static str = "task";

    fn node_id(&self) -> i64 {
        self.task.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.task.parent_id
    }

    fn dependency_ids(&self) -> &[i64] {
        &self.dependency_ids
    }
}

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let status = TaskStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown task status '{}'", status).into(),
        )
    })?;

    Ok(Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        parent_id: row.get("parent_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status,
        start_date: from_ms(6, row.get("start_at")?)?,
        duration: row.get("duration_secs")?,
        assignee_id: row.get("assignee_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Insert a task with no parent and no dependencies. Returns the new id.
pub(crate) fn insert_task(
    conn: &Connection,
    project_id: i64,
    fields: &TaskFields,
    now: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO tasks (
            project_id, parent_id, name, description, status, start_at,
            duration_secs, assignee_id, created_at, updated_at
        ) VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            project_id,
            fields.name,
            fields.description,
            fields.status.as_str(),
            fields.start_date.timestamp_millis(),
            fields.duration,
            fields.assignee_id,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite the scalar fields of an existing task.
pub(crate) fn update_task_fields(
    conn: &Connection,
    task_id: i64,
    fields: &TaskFields,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET name = ?2, description = ?3, status = ?4, start_at = ?5,
             duration_secs = ?6, assignee_id = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            task_id,
            fields.name,
            fields.description,
            fields.status.as_str(),
            fields.start_date.timestamp_millis(),
            fields.duration,
            fields.assignee_id,
            now,
        ],
    )?;
    Ok(())
}

pub(crate) fn set_parent(conn: &Connection, task_id: i64, parent_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET parent_id = ?2 WHERE id = ?1",
        params![task_id, parent_id],
    )?;
    Ok(())
}

pub(crate) fn touch(conn: &Connection, task_id: i64, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET updated_at = ?2 WHERE id = ?1",
        params![task_id, now],
    )?;
    Ok(())
}

/// Delete a single task row. Edges and children must already be gone.
pub(crate) fn delete_task(conn: &Connection, task_id: i64) -> Result<()> {
    conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
    Ok(())
}

pub(crate) fn get_task_internal(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))?;

    match stmt.query_row(params![task_id], parse_task_row) {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All tasks of a project, ordered by id.
pub(crate) fn project_tasks(conn: &Connection, project_id: i64) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY id",
        TASK_COLUMNS
    ))?;

    let tasks = stmt
        .query_map(params![project_id], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tasks)
}

/// All tasks of a project with computed end dates and both edge directions.
pub(crate) fn load_task_views(conn: &Connection, project_id: i64) -> Result<Vec<TaskView>> {
    let tasks = project_tasks(conn, project_id)?;
    let mut dependencies = deps::dependency_map(conn, project_id)?;
    let mut dependents = deps::dependent_map(conn, project_id)?;

    Ok(tasks
        .into_iter()
        .map(|task| {
            let id = task.id;
            TaskView {
                end_date: task.end_date(),
                dependency_ids: dependencies.remove(&id).unwrap_or_default(),
                dependent_ids: dependents.remove(&id).unwrap_or_default(),
                task,
            }
        })
        .collect())
}

impl Database {
    /// Get a single task with its edges.
    pub fn get_task(&self, task_id: i64) -> Result<Option<TaskView>> {
        self.with_conn(|conn| {
            let Some(task) = get_task_internal(conn, task_id)? else {
                return Ok(None);
            };
            Ok(Some(TaskView {
                end_date: task.end_date(),
                dependency_ids: deps::dependencies_of(conn, task_id)?,
                dependent_ids: deps::dependents_of(conn, task_id)?,
                task,
            }))
        })
    }

    /// Get every task of a project as a flat list ordered by id.
    pub fn get_project_tasks(&self, project_id: i64) -> Result<Vec<TaskView>> {
        self.with_conn(|conn| load_task_views(conn, project_id))
    }

    /// Get a project's tasks nested under their parents.
    pub fn get_project_tree(&self, project_id: i64) -> Result<Forest<TaskView>> {
        Ok(Forest::build(self.get_project_tasks(project_id)?))
    }

    /// Check a stored project for parent cycles, dependency cycles, and
    /// dependencies that leave the project.
    pub fn audit_project(&self, project_id: i64) -> Result<HierarchyAudit> {
        Ok(audit(&self.get_project_tasks(project_id)?))
    }
}
