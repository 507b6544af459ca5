//! Core types for the project planner.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    OnHold,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::OnHold,
        TaskStatus::Cancelled,
    ];

    /// Canonical storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not-started",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::OnHold => "on-hold",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a status string case-insensitively.
    ///
    /// `_`, `-` and spaces are interchangeable, so `NOT_STARTED`,
    /// `not-started` and `Not Started` all parse to [`TaskStatus::NotStarted`].
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the end of a task from its start and duration in seconds.
///
/// Saturates at the maximum representable timestamp instead of overflowing.
pub fn end_date(start: DateTime<Utc>, duration_secs: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(duration_secs)
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A project owning a task forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub account_id: i64,
    pub created_by: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A persisted task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub start_date: DateTime<Utc>,
    /// Duration in seconds.
    pub duration: i64,
    pub assignee_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn end_date(&self) -> DateTime<Utc> {
        end_date(self.start_date, self.duration)
    }
}

/// A task as returned to callers: the persisted row plus the computed end
/// date and both directions of the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub end_date: DateTime<Utc>,
    /// Tasks this task cannot start before.
    pub dependency_ids: Vec<i64>,
    /// Tasks that depend on this task.
    pub dependent_ids: Vec<i64>,
}

/// Project fields supplied by a client on create or update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// Owning account. Required on create, ignored on update.
    #[serde(default)]
    pub account_id: Option<i64>,
    /// Creating user. Required on create, ignored on update.
    #[serde(default)]
    pub created_by: Option<i64>,
}

/// One task as described by a client payload.
///
/// `temporary_id`, `parent_id` and `dependencies` are client-local
/// identifiers that only mean something within a single reconciliation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientTask {
    #[serde(default)]
    pub temporary_id: String,
    /// Server id of the task this record updates, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<i64>,
}

/// A complete create-or-update payload for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    /// Target project; absent for a create call.
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub project: Option<ProjectInput>,
    #[serde(default)]
    pub tasks: Vec<ClientTask>,
}
