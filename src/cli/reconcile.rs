//! Reconcile subcommand.

use crate::config::ReconcileConfig;
use crate::error::ReconcileResult;
use crate::reconcile::validate::parse_request;
use crate::reconcile::{DanglingPolicy, ReconcileOptions};
use crate::types::ReconcileRequest;
use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;
use std::path::PathBuf;

/// Arguments for the reconcile subcommand
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// JSON payload file, or `-` for stdin
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Target project (overrides `project_id` in the payload)
    #[arg(short, long, value_name = "ID")]
    pub project: Option<i64>,

    /// Fail on links to unknown temporary ids instead of dropping them
    #[arg(long)]
    pub reject_dangling: bool,

    /// Print compact JSON
    #[arg(long)]
    pub compact: bool,
}

impl ReconcileArgs {
    /// Read the raw payload from the file or stdin.
    pub fn read_payload(&self) -> Result<String> {
        if self.file.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read payload from stdin")?;
            Ok(buf)
        } else {
            std::fs::read_to_string(&self.file)
                .with_context(|| format!("failed to read payload {}", self.file.display()))
        }
    }

    /// Parse a payload, applying `--project`.
    pub fn parse(&self, content: &str) -> ReconcileResult<ReconcileRequest> {
        let mut request = parse_request(content)?;
        if let Some(project_id) = self.project {
            request.project_id = Some(project_id);
        }
        Ok(request)
    }

    pub fn options(&self, config: &ReconcileConfig) -> ReconcileOptions {
        let mut options = config.options();
        if self.reject_dangling {
            options.dangling_references = DanglingPolicy::Reject;
        }
        options
    }
}
