//! project-planner CLI.

use anyhow::Result;
use clap::Parser;
use project_planner::cli::project::{CheckArgs, DeleteArgs, ListArgs, ShowArgs};
use project_planner::cli::reconcile::ReconcileArgs;
use project_planner::cli::template::{TemplateArgs, TemplateCommand};
use project_planner::cli::{Cli, Command};
use project_planner::config::Config;
use project_planner::db::templates::TemplateInput;
use project_planner::logging::{self, LogTarget};
use project_planner::{Database, ReconcileError};
use serde::Serialize;
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let (mut config, config_path) = Config::resolve(cli.config.as_deref())?;
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.clone();
    }
    match &config_path {
        Some(path) => debug!(config = %path.display(), "Loaded configuration"),
        None => debug!("Using default configuration"),
    }

    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)?;
    info!(db = %config.server.db_path.display(), "Opened database");

    match cli.command {
        Command::Reconcile(args) => run_reconcile(&db, &config, args),
        Command::List(args) => run_list(&db, args),
        Command::Show(args) => run_show(&db, args),
        Command::Check(args) => run_check(&db, args),
        Command::Delete(args) => run_delete(&db, args),
        Command::Template(args) => run_template(&db, &config, args),
    }
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}

/// Print the caller-facing error report and exit with status 1.
fn fail(err: ReconcileError) -> Result<()> {
    print_json(&err.report(), false)?;
    std::process::exit(1);
}

fn run_reconcile(db: &Database, config: &Config, args: ReconcileArgs) -> Result<()> {
    let content = args.read_payload()?;
    let request = match args.parse(&content) {
        Ok(request) => request,
        Err(err) => return fail(err),
    };
    match db.reconcile(&request, &args.options(&config.reconcile)) {
        Ok(outcome) => print_json(&outcome, args.compact),
        Err(err) => fail(err),
    }
}

fn run_list(db: &Database, args: ListArgs) -> Result<()> {
    print_json(&db.list_projects(args.account)?, false)
}

fn run_show(db: &Database, args: ShowArgs) -> Result<()> {
    let Some(project) = db.get_project(args.project_id)? else {
        return fail(ReconcileError::project_not_found(args.project_id));
    };

    if args.tree {
        let tree = db.get_project_tree(args.project_id)?;
        print_json(
            &serde_json::json!({ "project": project, "tasks": tree }),
            args.compact,
        )
    } else {
        let tasks = db.get_project_tasks(args.project_id)?;
        print_json(
            &serde_json::json!({ "project": project, "tasks": tasks }),
            args.compact,
        )
    }
}

fn run_check(db: &Database, args: CheckArgs) -> Result<()> {
    if db.get_project(args.project_id)?.is_none() {
        return fail(ReconcileError::project_not_found(args.project_id));
    }

    let audit = db.audit_project(args.project_id)?;
    print_json(&audit, false)?;
    if !audit.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_delete(db: &Database, args: DeleteArgs) -> Result<()> {
    match db.delete_project(args.project_id) {
        Ok(deleted) => print_json(
            &serde_json::json!({ "project_id": args.project_id, "deleted_tasks": deleted }),
            false,
        ),
        Err(err) => fail(err),
    }
}

fn run_template(db: &Database, config: &Config, args: TemplateArgs) -> Result<()> {
    match args.command {
        TemplateCommand::List => print_json(&db.list_templates()?, false),
        TemplateCommand::Show { template_id } => match db.get_template(template_id)? {
            Some(detail) => print_json(&detail, false),
            None => fail(ReconcileError::template_not_found(template_id)),
        },
        TemplateCommand::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let input: TemplateInput = serde_json::from_str(&content)?;
            match db.create_template(&input) {
                Ok(created) => print_json(&created, false),
                Err(err) => fail(err),
            }
        }
        TemplateCommand::Instantiate(args) => {
            let start = args.start()?;
            let options = config.reconcile.options();
            match db.instantiate_template(args.template_id, &args.project_input(), start, &options)
            {
                Ok(outcome) => print_json(&outcome, false),
                Err(err) => fail(err),
            }
        }
    }
}
