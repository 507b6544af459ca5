//! Project rows.

use super::{Database, from_ms};
use crate::types::Project;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

const PROJECT_COLUMNS: &str =
    "id, name, description, start_at, end_at, account_id, created_by, created_at, updated_at";

/// Validated fields for a new project.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub account_id: i64,
    pub created_by: i64,
}

impl NewProject {
    /// A project with only the required fields set.
    pub fn named(name: impl Into<String>, account_id: i64, created_by: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            start_date: None,
            end_date: None,
            account_id,
            created_by,
        }
    }
}

/// Validated replacement fields for an existing project. A `None` name keeps
/// the stored name; the other fields are replaced as given.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

fn optional_date(column: usize, ms: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    ms.map(|ms| from_ms(column, ms)).transpose()
}

pub fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        start_date: optional_date(3, row.get("start_at")?)?,
        end_date: optional_date(4, row.get("end_at")?)?,
        account_id: row.get("account_id")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn insert_project(conn: &Connection, project: &NewProject, now: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO projects (
            name, description, start_at, end_at, account_id, created_by, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            project.name,
            project.description,
            project.start_date.map(|d| d.timestamp_millis()),
            project.end_date.map(|d| d.timestamp_millis()),
            project.account_id,
            project.created_by,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn update_project(
    conn: &Connection,
    project_id: i64,
    patch: &ProjectPatch,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE projects SET name = COALESCE(?2, name), description = ?3,
             start_at = ?4, end_at = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            project_id,
            patch.name,
            patch.description,
            patch.start_date.map(|d| d.timestamp_millis()),
            patch.end_date.map(|d| d.timestamp_millis()),
            now,
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_project_row(conn: &Connection, project_id: i64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
    Ok(deleted)
}

pub(crate) fn get_project_internal(conn: &Connection, project_id: i64) -> Result<Option<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM projects WHERE id = ?1",
        PROJECT_COLUMNS
    ))?;

    match stmt.query_row(params![project_id], parse_project_row) {
        Ok(project) => Ok(Some(project)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Get a project by id.
    pub fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        self.with_conn(|conn| get_project_internal(conn, project_id))
    }

    /// List projects, optionally restricted to one owning account.
    pub fn list_projects(&self, account_id: Option<i64>) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM projects", PROJECT_COLUMNS);
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(account_id) = account_id {
                sql.push_str(" WHERE account_id = ?");
                params_vec.push(Box::new(account_id));
            }

            sql.push_str(" ORDER BY id");

            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();
            let projects = stmt
                .query_map(params_refs.as_slice(), parse_project_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(projects)
        })
    }
}
