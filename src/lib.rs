//! Project planner: transactional reconciliation of project task trees and
//! dependency graphs, backed by SQLite.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod logging;
pub mod reconcile;
pub mod types;

pub use db::Database;
pub use error::{ErrorReport, ReconcileError, ReconcileResult};
pub use reconcile::{DanglingPolicy, ReconcileOptions, ReconcileOutcome, ReconcileStats};
