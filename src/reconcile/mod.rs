//! Task-tree and dependency-graph reconciliation.
//!
//! A reconciliation call takes the complete desired state of one project's
//! tasks and makes storage match it inside a single transaction:
//!
//! 1. validate the payload (fields, duplicate ids, parent and dependency cycles)
//! 2. diff it against the stored tasks by persistent id
//! 3. delete omitted tasks leaf-first
//! 4. write fields, then parent links and dependency edges
//!
//! Any error drops the transaction, leaving storage as it was.

pub mod deletion;
pub mod differ;
mod edges;
pub mod identity;
mod materialize;
pub mod validate;

use crate::db::projects::{self, get_project_internal};
use crate::db::tasks::{load_task_views, project_tasks};
use crate::db::{Database, now_ms};
use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{ClientTask, Project, ProjectInput, ReconcileRequest, TaskView};
use chrono::SecondsFormat;
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

pub use differ::TreeDiff;
pub use identity::{DanglingReference, IdentityMap, LinkKind};
use materialize::{StoredState, materialize};

/// What to do with links naming a temporary id the payload does not define.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DanglingPolicy {
    /// Drop the link, report it in the outcome, and log a warning.
    #[default]
    Warn,
    /// Fail the call with a validation error.
    Reject,
}

impl DanglingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DanglingPolicy::Warn => "warn",
            DanglingPolicy::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Some(DanglingPolicy::Warn),
            "reject" => Some(DanglingPolicy::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub dangling_references: DanglingPolicy,
}

/// Counters for one reconciliation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    #[serde(default)]
    pub dangling_references: Vec<DanglingReference>,
}

/// Result of a successful reconciliation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub project: Project,
    pub tasks: Vec<TaskView>,
    pub stats: ReconcileStats,
}

pub(crate) fn format_timestamp(date: chrono::DateTime<chrono::Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ReconcileOutcome {
    /// Build a request describing the current state, using each persistent
    /// id as the temporary id. Submitting it changes nothing.
    pub fn to_request(&self) -> ReconcileRequest {
        let tasks = self
            .tasks
            .iter()
            .map(|view| {
                let task = &view.task;
                ClientTask {
                    temporary_id: task.id.to_string(),
                    persistent_id: Some(task.id),
                    name: Some(task.name.clone()),
                    description: task.description.clone(),
                    status: Some(task.status.as_str().to_string()),
                    start_date: Some(format_timestamp(task.start_date)),
                    duration: Some(task.duration),
                    parent_id: task.parent_id.map(|id| id.to_string()),
                    dependencies: view.dependency_ids.iter().map(|id| id.to_string()).collect(),
                    assignee_id: task.assignee_id,
                }
            })
            .collect();

        ReconcileRequest {
            project_id: Some(self.project.id),
            project: Some(ProjectInput {
                name: Some(self.project.name.clone()),
                description: self.project.description.clone(),
                start_date: self.project.start_date.map(format_timestamp),
                end_date: self.project.end_date.map(format_timestamp),
                account_id: Some(self.project.account_id),
                created_by: Some(self.project.created_by),
            }),
            tasks,
        }
    }

    /// Find a task by name. Names are not unique; the first match wins.
    pub fn task_named(&self, name: &str) -> Option<&TaskView> {
        self.tasks.iter().find(|view| view.task.name == name)
    }
}

impl Database {
    /// Make the stored tasks of a project match `request`.
    ///
    /// Creates the project when `request.project_id` is absent. The call is
    /// all-or-nothing.
    pub fn reconcile(
        &self,
        request: &ReconcileRequest,
        options: &ReconcileOptions,
    ) -> ReconcileResult<ReconcileOutcome> {
        info!(
            project_id = ?request.project_id,
            tasks = request.tasks.len(),
            "Reconciling project"
        );

        let result = self.reconcile_in_transaction(request, options);
        match &result {
            Ok(outcome) => info!(
                project_id = outcome.project.id,
                created = outcome.stats.created,
                updated = outcome.stats.updated,
                unchanged = outcome.stats.unchanged,
                deleted = outcome.stats.deleted,
                dangling = outcome.stats.dangling_references.len(),
                "Reconciliation committed"
            ),
            Err(ReconcileError::Storage(e)) => {
                error!(error = ?e, "Reconciliation failed in storage")
            }
            Err(e) => warn!(
                stage = ?e.stage(),
                code = ?e.code(),
                temporary_id = ?e.temporary_id(),
                "Reconciliation rejected: {}",
                e
            ),
        }
        result
    }

    fn reconcile_in_transaction(
        &self,
        request: &ReconcileRequest,
        options: &ReconcileOptions,
    ) -> ReconcileResult<ReconcileOutcome> {
        let records = validate::validate_tasks(&request.tasks, options.dangling_references)?;
        let new_project = match request.project_id {
            None => Some(validate::validate_new_project(request.project.as_ref())?),
            Some(_) => None,
        };
        let patch = match (request.project_id, &request.project) {
            (Some(_), Some(input)) => Some(validate::validate_project_patch(input)?),
            _ => None,
        };

        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_ms();

        let project_id = match (request.project_id, new_project) {
            (Some(id), _) => {
                if get_project_internal(&tx, id)?.is_none() {
                    return Err(ReconcileError::project_not_found(id));
                }
                if let Some(patch) = &patch {
                    projects::update_project(&tx, id, patch, now)?;
                }
                id
            }
            (None, Some(new_project)) => projects::insert_project(&tx, &new_project, now)?,
            (None, None) => {
                return Err(ReconcileError::project_field(
                    "project",
                    "project fields are required to create a project",
                ));
            }
        };

        let stored = StoredState::load(&tx, project_id)?;
        let diff = TreeDiff::compute(&stored.ids(), &records);
        debug!(
            project_id,
            create = diff.create.len(),
            update = diff.update.len(),
            delete = diff.delete.len(),
            "Computed tree diff"
        );

        let deletion = deletion::delete_tasks(&tx, &stored.parents(), &diff.delete)?;
        if !deletion.detached.is_empty() {
            debug!(detached = ?deletion.detached, "Detached children of deleted tasks");
        }

        let materialized = materialize(&tx, project_id, &records, &diff, &stored, now)?;

        let project = get_project_internal(&tx, project_id)?
            .ok_or_else(|| ReconcileError::project_not_found(project_id))?;
        let tasks = load_task_views(&tx, project_id)?;

        tx.commit()?;

        Ok(ReconcileOutcome {
            project,
            tasks,
            stats: ReconcileStats {
                created: materialized.created,
                updated: materialized.updated,
                unchanged: materialized.unchanged,
                deleted: deletion.deleted,
                dangling_references: materialized.dangling,
            },
        })
    }

    /// Delete a project and all of its tasks, leaf-first. Returns the number
    /// of tasks deleted.
    pub fn delete_project(&self, project_id: i64) -> ReconcileResult<usize> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if get_project_internal(&tx, project_id)?.is_none() {
            return Err(ReconcileError::project_not_found(project_id));
        }

        let tasks = project_tasks(&tx, project_id)?;
        let parents = tasks.iter().map(|task| (task.id, task.parent_id)).collect();
        let candidates: BTreeSet<i64> = tasks.iter().map(|task| task.id).collect();

        let report = deletion::delete_tasks(&tx, &parents, &candidates)?;
        projects::delete_project_row(&tx, project_id)?;
        tx.commit()?;

        info!(project_id, deleted = report.deleted, "Deleted project");
        Ok(report.deleted)
    }
}
