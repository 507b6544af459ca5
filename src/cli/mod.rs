//! CLI command definitions for project-planner
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod project;
pub mod reconcile;
pub mod template;

use clap::{Parser, Subcommand};
use project::{CheckArgs, DeleteArgs, ListArgs, ShowArgs};
use reconcile::ReconcileArgs;
use std::path::PathBuf;
use template::TemplateArgs;

/// Project planner: task-tree and dependency-graph reconciliation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile a project against a JSON payload
    Reconcile(ReconcileArgs),

    /// List projects
    List(ListArgs),

    /// Print a project and its tasks
    Show(ShowArgs),

    /// Check a stored project for cycles and cross-project dependencies
    Check(CheckArgs),

    /// Delete a project and all of its tasks
    Delete(DeleteArgs),

    /// Manage project templates
    Template(TemplateArgs),
}
