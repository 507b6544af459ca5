//! Project read and delete subcommands.

use clap::Args;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only projects owned by this account
    #[arg(long, value_name = "ID")]
    pub account: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub project_id: i64,

    /// Nest tasks under their parents
    #[arg(long)]
    pub tree: bool,

    /// Print compact JSON
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    pub project_id: i64,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub project_id: i64,
}
