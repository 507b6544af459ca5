//! Project templates: reusable task-template trees that can be turned into
//! new projects.
//!
//! Templates are written once (seeding, `template import`) and read many
//! times. Instantiation goes through the reconciliation engine as an ordinary
//! create call, so a template produces exactly the tree a client would get by
//! submitting the same payload by hand.

use super::Database;
use crate::error::{ErrorCode, ReconcileError, ReconcileResult};
use crate::hierarchy::{Forest, Hierarchical};
use crate::reconcile::validate::{LinkSpec, check_links};
use crate::reconcile::{
    DanglingPolicy, DanglingReference, IdentityMap, LinkKind, ReconcileOptions, ReconcileOutcome,
    format_timestamp,
};
use crate::types::{ClientTask, ProjectInput, ReconcileRequest};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;

const DEFAULT_TEMPLATE_DURATION: i64 = 86_400;

fn default_duration() -> i64 {
    DEFAULT_TEMPLATE_DURATION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// One task of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: i64,
    pub project_template_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    /// Duration in seconds.
    pub duration: i64,
    pub dependency_ids: Vec<i64>,
}

impl Hierarchical for TaskTemplate {
    const KIND: &'static str = "task_template";

    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    fn dependency_ids(&self) -> &[i64] {
        &self.dependency_ids
    }
}

/// A template with its task templates nested under their parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub template: ProjectTemplate,
    pub tasks: Forest<TaskTemplate>,
}

/// Client description of a template to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TemplateTaskInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTaskInput {
    pub temporary_id: String,
    pub name: String,
    /// Duration in seconds. Defaults to one day.
    #[serde(default = "default_duration")]
    pub duration: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTemplate {
    pub template: TemplateDetail,
    pub dangling_references: Vec<DanglingReference>,
}

fn parse_template_row(row: &Row) -> rusqlite::Result<ProjectTemplate> {
    Ok(ProjectTemplate {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
    })
}

fn get_template_row(conn: &Connection, template_id: i64) -> Result<Option<ProjectTemplate>> {
    let template = conn
        .query_row(
            "SELECT id, name, description FROM project_templates WHERE id = ?1",
            params![template_id],
            parse_template_row,
        )
        .optional()?;
    Ok(template)
}

/// All task templates of a template with their dependency ids, ordered by id.
fn template_tasks(conn: &Connection, template_id: i64) -> Result<Vec<TaskTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT d.task_template_id, d.depends_on_task_template_id
         FROM task_template_dependencies d
         INNER JOIN task_templates t ON t.id = d.task_template_id
         WHERE t.project_template_id = ?1
         ORDER BY d.task_template_id, d.depends_on_task_template_id",
    )?;
    let mut dependencies: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let edges = stmt.query_map(params![template_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    for edge in edges {
        let (task, target) = edge?;
        dependencies.entry(task).or_default().push(target);
    }

    let mut stmt = conn.prepare(
        "SELECT id, project_template_id, parent_id, name, duration_secs
         FROM task_templates WHERE project_template_id = ?1 ORDER BY id",
    )?;
    let tasks = stmt
        .query_map(params![template_id], |row| {
            let id: i64 = row.get(0)?;
            Ok(TaskTemplate {
                id,
                project_template_id: row.get(1)?,
                parent_id: row.get(2)?,
                name: row.get(3)?,
                duration: row.get(4)?,
                dependency_ids: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tasks
        .into_iter()
        .map(|mut task| {
            task.dependency_ids = dependencies.remove(&task.id).unwrap_or_default();
            task
        })
        .collect())
}

fn validate_template(input: &TemplateInput) -> ReconcileResult<()> {
    if input.name.trim().is_empty() {
        return Err(ReconcileError::project_field("name", "template name is required"));
    }

    let mut seen = HashSet::new();
    for (index, task) in input.tasks.iter().enumerate() {
        if task.temporary_id.trim().is_empty() {
            return Err(ReconcileError::missing_field(
                &format!("#{}", index),
                "temporary_id",
            ));
        }
        if task.name.trim().is_empty() {
            return Err(ReconcileError::missing_field(&task.temporary_id, "name"));
        }
        if task.duration < 0 {
            return Err(ReconcileError::invalid_value(
                &task.temporary_id,
                "duration",
                "must be non-negative",
            ));
        }
        if !seen.insert(task.temporary_id.as_str()) {
            return Err(ReconcileError::duplicate_temporary_id(&task.temporary_id));
        }
    }

    let links: Vec<LinkSpec<'_>> = input
        .tasks
        .iter()
        .map(|task| LinkSpec {
            temporary_id: &task.temporary_id,
            parent_id: task.parent_id.as_deref(),
            dependencies: &task.dependencies,
        })
        .collect();
    check_links(&links, DanglingPolicy::Warn)
}

impl Database {
    /// Store a new template and its task tree.
    ///
    /// Parent and dependency links are given by temporary id. Links to ids the
    /// input does not define are dropped and reported.
    pub fn create_template(&self, input: &TemplateInput) -> ReconcileResult<CreatedTemplate> {
        validate_template(input)?;

        let (template_id, dangling) = {
            let mut conn = self.connection();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM project_templates WHERE name = ?1",
                    params![input.name],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(ReconcileError::Validation {
                    code: ErrorCode::InvalidFieldValue,
                    message: format!("template '{}' already exists", input.name),
                    temporary_id: None,
                    field: Some("name".to_string()),
                });
            }

            tx.execute(
                "INSERT INTO project_templates (name, description) VALUES (?1, ?2)",
                params![input.name, input.description],
            )?;
            let template_id = tx.last_insert_rowid();

            let mut ids = IdentityMap::new();
            for task in &input.tasks {
                tx.execute(
                    "INSERT INTO task_templates (project_template_id, parent_id, name, duration_secs)
                     VALUES (?1, NULL, ?2, ?3)",
                    params![template_id, task.name, task.duration],
                )?;
                ids.bind(&task.temporary_id, tx.last_insert_rowid());
            }

            for task in &input.tasks {
                let Some(id) = ids.get(&task.temporary_id) else {
                    continue;
                };
                if let Some(parent) = task.parent_id.as_deref() {
                    if let Some(parent_id) = ids.resolve(&task.temporary_id, parent, LinkKind::Parent)
                    {
                        tx.execute(
                            "UPDATE task_templates SET parent_id = ?2 WHERE id = ?1",
                            params![id, parent_id],
                        )?;
                    }
                }

                let targets: BTreeSet<i64> = task
                    .dependencies
                    .iter()
                    .filter_map(|dep| ids.resolve(&task.temporary_id, dep, LinkKind::Dependency))
                    .collect();
                for target in targets {
                    tx.execute(
                        "INSERT INTO task_template_dependencies
                             (task_template_id, depends_on_task_template_id)
                         VALUES (?1, ?2)",
                        params![id, target],
                    )?;
                }
            }

            tx.commit()?;
            (template_id, ids.into_dangling())
        };

        info!(
            template_id,
            name = %input.name,
            tasks = input.tasks.len(),
            "Created project template"
        );

        let template = self
            .get_template(template_id)?
            .ok_or_else(|| ReconcileError::template_not_found(template_id))?;
        Ok(CreatedTemplate {
            template,
            dangling_references: dangling,
        })
    }

    /// List every template, ordered by name.
    pub fn list_templates(&self) -> Result<Vec<ProjectTemplate>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description FROM project_templates ORDER BY name")?;
            let templates = stmt
                .query_map([], parse_template_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(templates)
        })
    }

    /// Get a template with its nested task-template tree.
    pub fn get_template(&self, template_id: i64) -> Result<Option<TemplateDetail>> {
        self.with_conn(|conn| {
            let Some(template) = get_template_row(conn, template_id)? else {
                return Ok(None);
            };
            let tasks = template_tasks(conn, template_id)?;
            Ok(Some(TemplateDetail {
                template,
                tasks: Forest::build(tasks),
            }))
        })
    }

    /// Create a new project from a template.
    ///
    /// Every task starts at `start`; no scheduling is applied. A missing
    /// project name or description is taken from the template.
    pub fn instantiate_template(
        &self,
        template_id: i64,
        project: &ProjectInput,
        start: DateTime<Utc>,
        options: &ReconcileOptions,
    ) -> ReconcileResult<ReconcileOutcome> {
        let (template, tasks) = self
            .with_conn(|conn| {
                let Some(template) = get_template_row(conn, template_id)? else {
                    return Ok(None);
                };
                Ok(Some((template, template_tasks(conn, template_id)?)))
            })?
            .ok_or_else(|| ReconcileError::template_not_found(template_id))?;

        let start_date = format_timestamp(start);
        let request = ReconcileRequest {
            project_id: None,
            project: Some(ProjectInput {
                name: non_blank(&project.name).or_else(|| Some(template.name.clone())),
                description: non_blank(&project.description)
                    .or_else(|| template.description.clone()),
                ..project.clone()
            }),
            tasks: tasks
                .iter()
                .map(|task| ClientTask {
                    temporary_id: task.id.to_string(),
                    name: Some(task.name.clone()),
                    start_date: Some(start_date.clone()),
                    duration: Some(task.duration),
                    parent_id: task.parent_id.map(|id| id.to_string()),
                    dependencies: task.dependency_ids.iter().map(|id| id.to_string()).collect(),
                    ..Default::default()
                })
                .collect(),
        };

        info!(
            template_id,
            template = %template.name,
            tasks = request.tasks.len(),
            "Instantiating project template"
        );
        self.reconcile(&request, options)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}
