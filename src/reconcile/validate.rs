//! Payload validation. Everything here runs before the first write.

use super::DanglingPolicy;
use crate::db::projects::{NewProject, ProjectPatch};
use crate::db::tasks::TaskFields;
use crate::error::{ErrorCode, ReconcileError, ReconcileResult};
use crate::graph::{find_dependency_cycle, find_parent_cycle};
use crate::types::{ClientTask, ProjectInput, ReconcileRequest, TaskStatus};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A client record whose fields have been parsed and checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTask {
    pub temporary_id: String,
    pub persistent_id: Option<i64>,
    pub fields: TaskFields,
    pub parent_id: Option<String>,
    pub dependencies: Vec<String>,
}

/// Parse a client timestamp.
///
/// Accepts RFC 3339, a date-time without offset (taken as UTC), or a bare
/// date (midnight UTC). The result is truncated to whole milliseconds, the
/// precision timestamps are stored at.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })?;

    DateTime::from_timestamp_millis(parsed.timestamp_millis())
}

fn invalid_project_value(field: &str, reason: &str) -> ReconcileError {
    ReconcileError::Validation {
        code: ErrorCode::InvalidFieldValue,
        message: format!("project: invalid {}: {}", field, reason),
        temporary_id: None,
        field: Some(field.to_string()),
    }
}

fn project_date(field: &str, value: Option<&str>) -> ReconcileResult<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            parse_timestamp(raw)
                .ok_or_else(|| invalid_project_value(field, &format!("'{}' is not a timestamp", raw)))
        })
        .transpose()
}

fn project_dates(
    input: &ProjectInput,
) -> ReconcileResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = project_date("start_date", input.start_date.as_deref())?;
    let end = project_date("end_date", input.end_date.as_deref())?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(invalid_project_value("end_date", "precedes start_date"));
        }
    }
    Ok((start, end))
}

/// Validate the project fields of a create call.
pub fn validate_new_project(input: Option<&ProjectInput>) -> ReconcileResult<NewProject> {
    let input = input.ok_or_else(|| {
        ReconcileError::project_field("project", "project fields are required to create a project")
    })?;

    let name = match input.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => return Err(ReconcileError::project_field("name", "project name is required")),
    };
    let account_id = input
        .account_id
        .ok_or_else(|| ReconcileError::project_field("account_id", "project account is required"))?;
    let created_by = input
        .created_by
        .ok_or_else(|| ReconcileError::project_field("created_by", "project creator is required"))?;
    let (start_date, end_date) = project_dates(input)?;

    Ok(NewProject {
        name,
        description: input.description.clone(),
        start_date,
        end_date,
        account_id,
        created_by,
    })
}

/// Validate the project fields of an update call. Ownership fields are
/// ignored.
pub fn validate_project_patch(input: &ProjectInput) -> ReconcileResult<ProjectPatch> {
    if let Some(name) = input.name.as_deref() {
        if name.trim().is_empty() {
            return Err(ReconcileError::project_field("name", "project name cannot be empty"));
        }
    }
    let (start_date, end_date) = project_dates(input)?;

    Ok(ProjectPatch {
        name: input.name.clone(),
        description: input.description.clone(),
        start_date,
        end_date,
    })
}

/// Validate one client record. `index` labels records without a temporary id.
pub fn validate_task(index: usize, record: &ClientTask) -> ReconcileResult<ValidatedTask> {
    if record.temporary_id.trim().is_empty() {
        return Err(ReconcileError::missing_field(
            &format!("#{}", index),
            "temporary_id",
        ));
    }
    let tmp = record.temporary_id.as_str();

    let name = match record.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => return Err(ReconcileError::missing_field(tmp, "name")),
    };

    let status = match record.status.as_deref() {
        None => TaskStatus::default(),
        Some(raw) => TaskStatus::parse(raw).ok_or_else(|| {
            ReconcileError::invalid_value(tmp, "status", &format!("unknown status '{}'", raw))
        })?,
    };

    let raw_start = record
        .start_date
        .as_deref()
        .ok_or_else(|| ReconcileError::missing_field(tmp, "start_date"))?;
    let start_date = parse_timestamp(raw_start).ok_or_else(|| {
        ReconcileError::invalid_value(
            tmp,
            "start_date",
            &format!("'{}' is not a timestamp", raw_start),
        )
    })?;

    let duration = record
        .duration
        .ok_or_else(|| ReconcileError::missing_field(tmp, "duration"))?;
    if duration < 0 {
        return Err(ReconcileError::invalid_value(
            tmp,
            "duration",
            "must be non-negative",
        ));
    }

    Ok(ValidatedTask {
        temporary_id: record.temporary_id.clone(),
        persistent_id: record.persistent_id,
        fields: TaskFields {
            name,
            description: record.description.clone(),
            status,
            start_date,
            duration,
            assignee_id: record.assignee_id,
        },
        parent_id: record.parent_id.clone(),
        dependencies: record.dependencies.clone(),
    })
}

/// Link shape of one record, independent of what kind of record it is.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkSpec<'a> {
    pub temporary_id: &'a str,
    pub parent_id: Option<&'a str>,
    pub dependencies: &'a [String],
}

/// Check the links of a payload: parent cycles, dependency cycles (including
/// self-dependencies), and, under [`DanglingPolicy::Reject`], links to
/// temporary ids the payload does not define.
pub(crate) fn check_links(links: &[LinkSpec<'_>], policy: DanglingPolicy) -> ReconcileResult<()> {
    let known: BTreeSet<&str> = links.iter().map(|link| link.temporary_id).collect();

    if policy == DanglingPolicy::Reject {
        for link in links {
            if let Some(parent) = link.parent_id.filter(|parent| !known.contains(parent)) {
                return Err(ReconcileError::dangling_reference(
                    link.temporary_id,
                    "parent_id",
                    parent,
                ));
            }
            if let Some(missing) = link
                .dependencies
                .iter()
                .find(|dep| !known.contains(dep.as_str()))
            {
                return Err(ReconcileError::dangling_reference(
                    link.temporary_id,
                    "dependencies",
                    missing,
                ));
            }
        }
    }

    let parents: BTreeMap<&str, Option<&str>> = links
        .iter()
        .map(|link| (link.temporary_id, link.parent_id))
        .collect();
    if let Some(cycle) = find_parent_cycle(&parents) {
        let cycle: Vec<String> = cycle.into_iter().map(str::to_string).collect();
        return Err(ReconcileError::parent_cycle(&cycle));
    }

    let edges: BTreeMap<&str, Vec<&str>> = links
        .iter()
        .map(|link| {
            (
                link.temporary_id,
                link.dependencies.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    if let Some(cycle) = find_dependency_cycle(&edges) {
        let cycle: Vec<String> = cycle.into_iter().map(str::to_string).collect();
        return Err(ReconcileError::dependency_cycle(&cycle));
    }

    Ok(())
}

/// Validate every record of a payload and the links between them.
pub fn validate_tasks(
    records: &[ClientTask],
    policy: DanglingPolicy,
) -> ReconcileResult<Vec<ValidatedTask>> {
    let mut tasks = Vec::with_capacity(records.len());
    let mut seen_temporary: BTreeSet<&str> = BTreeSet::new();
    let mut seen_persistent: HashMap<i64, &str> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let task = validate_task(index, record)?;

        if !seen_temporary.insert(record.temporary_id.as_str()) {
            return Err(ReconcileError::duplicate_temporary_id(&record.temporary_id));
        }
        if let Some(persistent_id) = record.persistent_id {
            if seen_persistent
                .insert(persistent_id, record.temporary_id.as_str())
                .is_some()
            {
                return Err(ReconcileError::duplicate_persistent_id(
                    &record.temporary_id,
                    persistent_id,
                ));
            }
        }

        tasks.push(task);
    }

    let links: Vec<LinkSpec<'_>> = tasks
        .iter()
        .map(|task| LinkSpec {
            temporary_id: &task.temporary_id,
            parent_id: task.parent_id.as_deref(),
            dependencies: &task.dependencies,
        })
        .collect();
    check_links(&links, policy)?;

    Ok(tasks)
}

/// Parse a JSON payload.
///
/// Task records are decoded one at a time so a wrongly typed field is
/// reported against the record's temporary id.
pub fn parse_request(content: &str) -> ReconcileResult<ReconcileRequest> {
    let mut value: Value = serde_json::from_str(content).map_err(ReconcileError::malformed_payload)?;

    let records = match value.as_object_mut().and_then(|object| object.remove("tasks")) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(records)) => records,
        Some(_) => return Err(ReconcileError::malformed_payload("tasks must be an array")),
    };

    let mut request: ReconcileRequest =
        serde_json::from_value(value).map_err(ReconcileError::malformed_payload)?;
    request.tasks = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let label = record
                .get("temporary_id")
                .and_then(Value::as_str)
                .filter(|tmp| !tmp.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index));
            serde_json::from_value::<ClientTask>(record)
                .map_err(|e| ReconcileError::malformed_task(&label, e))
        })
        .collect::<ReconcileResult<_>>()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorStage;
    use chrono::TimeZone;

    fn record(tmp: &str) -> ClientTask {
        ClientTask {
            temporary_id: tmp.to_string(),
            name: Some(format!("Task {}", tmp)),
            start_date: Some("2024-01-01T00:00:00Z".to_string()),
            duration: Some(3600),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 12:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-01"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("next tuesday"), None);
    }

    #[test]
    fn test_parse_timestamp_truncates_to_millis() {
        let parsed = parse_timestamp("2024-01-01T00:00:00.123456789Z").unwrap();
        assert_eq!(parsed.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_validate_task_defaults_status() {
        let task = validate_task(0, &record("a")).unwrap();
        assert_eq!(task.fields.status, TaskStatus::NotStarted);
        assert_eq!(task.fields.duration, 3600);
    }

    #[test]
    fn test_validate_task_missing_name() {
        let mut r = record("b");
        r.name = Some("   ".to_string());
        let report = validate_task(1, &r).unwrap_err().report();
        assert_eq!(report.code, ErrorCode::MissingRequiredField);
        assert_eq!(report.temporary_id.as_deref(), Some("b"));
        assert_eq!(report.field.as_deref(), Some("name"));
    }

    #[test]
    fn test_validate_task_rejects_bad_fields() {
        let mut r = record("a");
        r.status = Some("finished".to_string());
        assert_eq!(
            validate_task(0, &r).unwrap_err().report().field.as_deref(),
            Some("status")
        );

        let mut r = record("a");
        r.start_date = Some("soon".to_string());
        assert_eq!(
            validate_task(0, &r).unwrap_err().code(),
            ErrorCode::InvalidFieldValue
        );

        let mut r = record("a");
        r.duration = Some(-1);
        assert_eq!(
            validate_task(0, &r).unwrap_err().report().field.as_deref(),
            Some("duration")
        );

        let mut r = record("a");
        r.start_date = None;
        assert_eq!(
            validate_task(0, &r).unwrap_err().code(),
            ErrorCode::MissingRequiredField
        );
    }

    #[test]
    fn test_validate_tasks_duplicate_ids() {
        let err = validate_tasks(&[record("a"), record("a")], DanglingPolicy::Warn).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateTemporaryId);

        let mut a = record("a");
        a.persistent_id = Some(5);
        let mut b = record("b");
        b.persistent_id = Some(5);
        let err = validate_tasks(&[a, b], DanglingPolicy::Warn).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicatePersistentId);
        assert_eq!(err.temporary_id(), Some("b"));
    }

    #[test]
    fn test_validate_tasks_parent_cycle() {
        let mut a = record("a");
        a.parent_id = Some("b".to_string());
        let mut b = record("b");
        b.parent_id = Some("a".to_string());

        let err = validate_tasks(&[a, b], DanglingPolicy::Warn).unwrap_err();
        assert_eq!(err.stage(), ErrorStage::CycleDetected);
        assert_eq!(err.code(), ErrorCode::ParentCycle);
    }

    #[test]
    fn test_validate_tasks_self_dependency() {
        let mut a = record("a");
        a.dependencies = vec!["a".to_string()];
        let err = validate_tasks(&[a], DanglingPolicy::Warn).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DependencyCycle);
    }

    #[test]
    fn test_dangling_policy() {
        let mut a = record("a");
        a.dependencies = vec!["ghost".to_string()];

        assert!(validate_tasks(std::slice::from_ref(&a), DanglingPolicy::Warn).is_ok());

        let err = validate_tasks(&[a], DanglingPolicy::Reject).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DanglingReference);
        assert_eq!(err.report().field.as_deref(), Some("dependencies"));
    }

    #[test]
    fn test_validate_new_project() {
        let err = validate_new_project(None).unwrap_err();
        assert_eq!(err.report().field.as_deref(), Some("project"));

        let input = ProjectInput {
            name: Some("Launch".to_string()),
            account_id: Some(1),
            created_by: Some(2),
            start_date: Some("2024-02-01".to_string()),
            end_date: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        let err = validate_new_project(Some(&input)).unwrap_err();
        assert_eq!(err.report().field.as_deref(), Some("end_date"));

        let input = ProjectInput {
            end_date: None,
            ..input
        };
        let project = validate_new_project(Some(&input)).unwrap();
        assert_eq!(project.name, "Launch");
        assert_eq!(project.created_by, 2);
    }

    #[test]
    fn test_validate_project_patch_blank_name() {
        let input = ProjectInput {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(validate_project_patch(&input).is_err());
        assert_eq!(
            validate_project_patch(&ProjectInput::default()).unwrap().name,
            None
        );
    }

    #[test]
    fn test_parse_request_reads_tasks() {
        let request = parse_request(
            r#"{"project_id": 4, "tasks": [{"temporary_id": "a", "name": "A", "duration": 60}]}"#,
        )
        .unwrap();
        assert_eq!(request.project_id, Some(4));
        assert_eq!(request.tasks.len(), 1);
        assert_eq!(request.tasks[0].duration, Some(60));

        let empty = parse_request(r#"{"project_id": 4}"#).unwrap();
        assert!(empty.tasks.is_empty());
    }

    #[test]
    fn test_parse_request_names_mistyped_record() {
        let err = parse_request(
            r#"{"tasks": [{"temporary_id": "a", "name": "A"}, {"temporary_id": "b", "duration": "abc"}]}"#,
        )
        .unwrap_err();
        let report = err.report();
        assert_eq!(report.stage, ErrorStage::Validation);
        assert_eq!(report.code, ErrorCode::InvalidFieldValue);
        assert_eq!(report.temporary_id.as_deref(), Some("b"));

        let err = parse_request(r#"{"tasks": [{"duration": true}]}"#).unwrap_err();
        assert_eq!(err.temporary_id(), Some("#0"));
    }

    #[test]
    fn test_parse_request_rejects_bad_shapes() {
        for content in ["{not json", r#"{"tasks": 3}"#, r#"{"project_id": "x"}"#] {
            let err = parse_request(content).unwrap_err();
            assert_eq!(err.stage(), ErrorStage::Validation, "{}", content);
            assert_eq!(err.temporary_id(), None);
        }
    }
}
