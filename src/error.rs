//! Structured errors for reconciliation calls.

use serde::Serialize;
use thiserror::Error;

/// Stage of a reconciliation call that failed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Validation,
    CycleDetected,
    Storage,
}

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    DuplicateTemporaryId,
    DuplicatePersistentId,
    DanglingReference,
    NotFound,

    // Structural errors
    ParentCycle,
    DependencyCycle,
    DeletionCycle,

    // Internal errors
    DatabaseError,
}

/// Error raised by a reconciliation call or template operation.
///
/// Every variant aborts the surrounding transaction.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A client record or project field is missing or malformed.
    #[error("{message}")]
    Validation {
        code: ErrorCode,
        message: String,
        temporary_id: Option<String>,
        field: Option<String>,
    },

    /// The parent tree or dependency graph would be cyclic.
    #[error("{message}")]
    Structural {
        code: ErrorCode,
        message: String,
        temporary_id: Option<String>,
        task_ids: Vec<i64>,
    },

    /// Underlying SQLite or migration failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ReconcileError {
    fn from(err: rusqlite::Error) -> Self {
        ReconcileError::Storage(err.into())
    }
}

impl ReconcileError {
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        ReconcileError::Validation {
            code,
            message: message.into(),
            temporary_id: None,
            field: None,
        }
    }

    // Convenience constructors

    pub fn missing_field(temporary_id: &str, field: &str) -> Self {
        ReconcileError::Validation {
            code: ErrorCode::MissingRequiredField,
            message: format!("task '{}': {} is required", temporary_id, field),
            temporary_id: Some(temporary_id.to_string()),
            field: Some(field.to_string()),
        }
    }

    pub fn invalid_value(temporary_id: &str, field: &str, reason: &str) -> Self {
        ReconcileError::Validation {
            code: ErrorCode::InvalidFieldValue,
            message: format!("task '{}': invalid {}: {}", temporary_id, field, reason),
            temporary_id: Some(temporary_id.to_string()),
            field: Some(field.to_string()),
        }
    }

    pub fn project_field(field: &str, message: impl Into<String>) -> Self {
        ReconcileError::Validation {
            code: ErrorCode::MissingRequiredField,
            message: message.into(),
            temporary_id: None,
            field: Some(field.to_string()),
        }
    }

    pub fn duplicate_temporary_id(temporary_id: &str) -> Self {
        ReconcileError::Validation {
            code: ErrorCode::DuplicateTemporaryId,
            message: format!("temporary id '{}' appears more than once", temporary_id),
            temporary_id: Some(temporary_id.to_string()),
            field: Some("temporary_id".to_string()),
        }
    }

    pub fn duplicate_persistent_id(temporary_id: &str, persistent_id: i64) -> Self {
        ReconcileError::Validation {
            code: ErrorCode::DuplicatePersistentId,
            message: format!(
                "task '{}': persistent id {} is already claimed by another record",
                temporary_id, persistent_id
            ),
            temporary_id: Some(temporary_id.to_string()),
            field: Some("persistent_id".to_string()),
        }
    }

    pub fn dangling_reference(temporary_id: &str, field: &str, missing: &str) -> Self {
        ReconcileError::Validation {
            code: ErrorCode::DanglingReference,
            message: format!(
                "task '{}': {} references unknown task '{}'",
                temporary_id, field, missing
            ),
            temporary_id: Some(temporary_id.to_string()),
            field: Some(field.to_string()),
        }
    }

    pub fn malformed_payload(reason: impl std::fmt::Display) -> Self {
        Self::validation(
            ErrorCode::InvalidFieldValue,
            format!("malformed payload: {}", reason),
        )
    }

    pub fn malformed_task(temporary_id: &str, reason: impl std::fmt::Display) -> Self {
        ReconcileError::Validation {
            code: ErrorCode::InvalidFieldValue,
            message: format!("task '{}': {}", temporary_id, reason),
            temporary_id: Some(temporary_id.to_string()),
            field: None,
        }
    }

    pub fn project_not_found(project_id: i64) -> Self {
        Self::validation(
            ErrorCode::NotFound,
            format!("project {} not found", project_id),
        )
    }

    pub fn template_not_found(template_id: i64) -> Self {
        Self::validation(
            ErrorCode::NotFound,
            format!("project template {} not found", template_id),
        )
    }

    pub fn parent_cycle(cycle: &[String]) -> Self {
        ReconcileError::Structural {
            code: ErrorCode::ParentCycle,
            message: format!("parent links form a cycle: {}", cycle.join(" -> ")),
            temporary_id: cycle.first().cloned(),
            task_ids: Vec::new(),
        }
    }

    pub fn dependency_cycle(cycle: &[String]) -> Self {
        ReconcileError::Structural {
            code: ErrorCode::DependencyCycle,
            message: format!("dependencies form a cycle: {}", cycle.join(" -> ")),
            temporary_id: cycle.first().cloned(),
            task_ids: Vec::new(),
        }
    }

    pub fn deletion_cycle(task_ids: Vec<i64>) -> Self {
        let listed: Vec<String> = task_ids.iter().map(|id| id.to_string()).collect();
        ReconcileError::Structural {
            code: ErrorCode::DeletionCycle,
            message: format!(
                "cannot order deletion of tasks with cyclic parent links: {}",
                listed.join(", ")
            ),
            temporary_id: None,
            task_ids,
        }
    }

    pub fn stage(&self) -> ErrorStage {
        match self {
            ReconcileError::Validation { .. } => ErrorStage::Validation,
            ReconcileError::Structural { .. } => ErrorStage::CycleDetected,
            ReconcileError::Storage(_) => ErrorStage::Storage,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ReconcileError::Validation { code, .. } | ReconcileError::Structural { code, .. } => {
                *code
            }
            ReconcileError::Storage(_) => ErrorCode::DatabaseError,
        }
    }

    pub fn temporary_id(&self) -> Option<&str> {
        match self {
            ReconcileError::Validation { temporary_id, .. }
            | ReconcileError::Structural { temporary_id, .. } => temporary_id.as_deref(),
            ReconcileError::Storage(_) => None,
        }
    }

    /// Caller-facing report. Storage details are withheld.
    pub fn report(&self) -> ErrorReport {
        match self {
            ReconcileError::Validation {
                code,
                message,
                temporary_id,
                field,
            } => ErrorReport {
                stage: ErrorStage::Validation,
                code: *code,
                message: message.clone(),
                temporary_id: temporary_id.clone(),
                field: field.clone(),
                task_ids: Vec::new(),
            },
            ReconcileError::Structural {
                code,
                message,
                temporary_id,
                task_ids,
            } => ErrorReport {
                stage: ErrorStage::CycleDetected,
                code: *code,
                message: message.clone(),
                temporary_id: temporary_id.clone(),
                field: None,
                task_ids: task_ids.clone(),
            },
            ReconcileError::Storage(_) => ErrorReport {
                stage: ErrorStage::Storage,
                code: ErrorCode::DatabaseError,
                message: "internal storage error".to_string(),
                temporary_id: None,
                field: None,
                task_ids: Vec::new(),
            },
        }
    }
}

/// Serializable failure response for a reconciliation call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorReport {
    pub stage: ErrorStage,
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub task_ids: Vec<i64>,
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
