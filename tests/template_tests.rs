//! Integration tests for the template catalog.

use chrono::{TimeZone, Utc};
use project_planner::db::Database;
use project_planner::db::templates::{TemplateInput, TemplateTaskInput};
use project_planner::error::ErrorCode;
use project_planner::reconcile::ReconcileOptions;
use project_planner::types::{ProjectInput, TaskStatus};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn step(tmp: &str, name: &str, duration: i64, parent: Option<&str>, deps: &[&str]) -> TemplateTaskInput {
    TemplateTaskInput {
        temporary_id: tmp.to_string(),
        name: name.to_string(),
        duration,
        parent_id: parent.map(str::to_string),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
    }
}

fn website_template(db: &Database) -> i64 {
    let input = TemplateInput {
        name: "Website".to_string(),
        description: Some("Marketing site".to_string()),
        tasks: vec![
            step("site", "Site", 0, None, &[]),
            step("design", "Design", 86_400, Some("site"), &[]),
            step("build", "Build", 172_800, Some("site"), &["design"]),
            step("launch", "Launch", 0, None, &["build"]),
        ],
    };
    db.create_template(&input)
        .expect("Failed to create template")
        .template
        .template
        .id
}

fn owner() -> ProjectInput {
    ProjectInput {
        account_id: Some(10),
        created_by: Some(20),
        ..Default::default()
    }
}

mod catalog_tests {
    use super::*;

    #[test]
    fn list_templates_orders_by_name() {
        let db = setup_db();
        for name in ["Zeta", "Alpha"] {
            db.create_template(&TemplateInput {
                name: name.to_string(),
                description: None,
                tasks: vec![],
            })
            .unwrap();
        }

        let names: Vec<String> = db
            .list_templates()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn get_template_returns_nested_tree() {
        let db = setup_db();
        let id = website_template(&db);

        let detail = db.get_template(id).unwrap().unwrap();
        assert_eq!(detail.template.description.as_deref(), Some("Marketing site"));
        assert_eq!(detail.tasks.len(), 4);
        assert!(detail.tasks.detached.is_empty());

        let roots: Vec<&str> = detail
            .tasks
            .roots
            .iter()
            .map(|node| node.item.name.as_str())
            .collect();
        assert_eq!(roots, vec!["Site", "Launch"]);

        let site = &detail.tasks.roots[0];
        let design = &site.children[0].item;
        let build = &site.children[1].item;
        assert_eq!(design.name, "Design");
        assert_eq!(build.duration, 172_800);
        assert_eq!(build.dependency_ids, vec![design.id]);
    }

    #[test]
    fn template_json_flattens_header() {
        let db = setup_db();
        let id = website_template(&db);
        let detail = db.get_template(id).unwrap().unwrap();

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["name"], "Website");
        assert_eq!(value["tasks"]["roots"][0]["name"], "Site");
        assert_eq!(value["tasks"]["roots"][0]["children"][0]["name"], "Design");
    }
}

mod instantiate_tests {
    use super::*;

    #[test]
    fn instantiate_creates_project_tree() {
        let db = setup_db();
        let id = website_template(&db);
        let start = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();

        let outcome = db
            .instantiate_template(id, &owner(), start, &ReconcileOptions::default())
            .unwrap();

        assert_eq!(outcome.project.name, "Website");
        assert_eq!(outcome.project.description.as_deref(), Some("Marketing site"));
        assert_eq!(outcome.project.account_id, 10);
        assert_eq!(outcome.stats.created, 4);
        assert!(outcome.stats.dangling_references.is_empty());

        for view in &outcome.tasks {
            assert_eq!(view.task.start_date, start);
            assert_eq!(view.task.status, TaskStatus::NotStarted);
        }

        let site = outcome.task_named("Site").unwrap();
        let design = outcome.task_named("Design").unwrap();
        let build = outcome.task_named("Build").unwrap();
        let launch = outcome.task_named("Launch").unwrap();
        assert_eq!(design.task.parent_id, Some(site.task.id));
        assert_eq!(build.task.parent_id, Some(site.task.id));
        assert_eq!(build.dependency_ids, vec![design.task.id]);
        assert_eq!(launch.dependency_ids, vec![build.task.id]);
        assert_eq!(
            build.end_date,
            Utc.with_ymd_and_hms(2024, 9, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn instantiate_twice_gives_independent_projects() {
        let db = setup_db();
        let id = website_template(&db);
        let start = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        let mut named = owner();
        named.name = Some("Second site".to_string());

        let first = db
            .instantiate_template(id, &owner(), start, &ReconcileOptions::default())
            .unwrap();
        let second = db
            .instantiate_template(id, &named, start, &ReconcileOptions::default())
            .unwrap();

        assert_ne!(first.project.id, second.project.id);
        assert_eq!(second.project.name, "Second site");
        let first_ids: Vec<i64> = first.tasks.iter().map(|t| t.task.id).collect();
        assert!(second.tasks.iter().all(|t| !first_ids.contains(&t.task.id)));
    }

    #[test]
    fn instantiate_blank_name_uses_template_values() {
        let db = setup_db();
        let id = website_template(&db);
        let mut blank = owner();
        blank.name = Some("   ".to_string());
        blank.description = Some(String::new());

        let outcome = db
            .instantiate_template(id, &blank, Utc::now(), &ReconcileOptions::default())
            .unwrap();

        assert_eq!(outcome.project.name, "Website");
        assert_eq!(outcome.project.description.as_deref(), Some("Marketing site"));
    }

    #[test]
    fn instantiate_missing_template_fails() {
        let db = setup_db();
        let err = db
            .instantiate_template(
                99,
                &owner(),
                Utc::now(),
                &ReconcileOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(db.list_projects(None).unwrap().is_empty());
    }

    #[test]
    fn instantiate_requires_owner() {
        let db = setup_db();
        let id = website_template(&db);
        let err = db
            .instantiate_template(
                id,
                &ProjectInput::default(),
                Utc::now(),
                &ReconcileOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.report().field.as_deref(), Some("account_id"));
    }
}
