//! Template subcommands.

use crate::reconcile::validate::parse_timestamp;
use crate::types::ProjectInput;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub command: TemplateCommand,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// List templates
    List,

    /// Print a template with its task tree
    Show {
        template_id: i64,
    },

    /// Create a template from a JSON file
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Create a project from a template
    Instantiate(InstantiateArgs),
}

#[derive(Args, Debug)]
pub struct InstantiateArgs {
    pub template_id: i64,

    /// Start of every task (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_name = "TIMESTAMP")]
    pub start: String,

    /// Owning account of the new project
    #[arg(long, value_name = "ID")]
    pub account: i64,

    /// Creating user of the new project
    #[arg(long, value_name = "ID")]
    pub created_by: i64,

    /// Project name (defaults to the template name)
    #[arg(long)]
    pub name: Option<String>,

    /// Project description (defaults to the template description)
    #[arg(long)]
    pub description: Option<String>,
}

impl InstantiateArgs {
    pub fn start(&self) -> Result<DateTime<Utc>> {
        parse_timestamp(&self.start).ok_or_else(|| anyhow!("invalid --start '{}'", self.start))
    }

    pub fn project_input(&self) -> ProjectInput {
        ProjectInput {
            name: self.name.clone(),
            description: self.description.clone(),
            account_id: Some(self.account),
            created_by: Some(self.created_by),
            ..Default::default()
        }
    }
}
