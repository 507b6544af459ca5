//! Configuration loading and management.
//!
//! Sources, highest priority first:
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables
//! 3. An explicit config file (`--config` or `PLANNER_CONFIG_PATH`)
//! 4. `planner/config.yaml` in the working directory
//! 5. `~/.planner/config.yaml`
//! 6. Built-in defaults

use crate::reconcile::{DanglingPolicy, ReconcileOptions};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Explicit config file; overrides the search locations.
pub const CONFIG_PATH_ENV: &str = "PLANNER_CONFIG_PATH";
/// Database path override.
pub const DB_PATH_ENV: &str = "PLANNER_DB_PATH";
/// Dangling-reference policy override (`warn` or `reject`).
pub const DANGLING_REFERENCES_ENV: &str = "PLANNER_DANGLING_REFERENCES";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("planner/planner.db")
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub dangling_references: DanglingPolicy,
}

impl ReconcileConfig {
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            dangling_references: self.dangling_references,
        }
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Config file locations searched when no explicit file is given.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("planner/config.yaml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".planner").join("config.yaml"));
        }
        paths
    }

    /// Resolve configuration from files and the process environment.
    ///
    /// Returns the config and the file it was read from, if any. An explicit
    /// file that cannot be read is an error; missing search-path files are
    /// skipped.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        Self::resolve_with(explicit, &Self::search_paths(), |key| std::env::var(key).ok())
    }

    /// [`Config::resolve`] with the search paths and environment supplied by
    /// the caller.
    pub fn resolve_with<F>(
        explicit: Option<&Path>,
        search_paths: &[PathBuf],
        lookup: F,
    ) -> Result<(Self, Option<PathBuf>)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| lookup(CONFIG_PATH_ENV).map(PathBuf::from));

        let (mut config, source) = match explicit {
            Some(path) => (Self::load(&path)?, Some(path)),
            None => match search_paths.iter().find(|path| path.is_file()) {
                Some(path) => (Self::load(path)?, Some(path.clone())),
                None => (Self::default(), None),
            },
        };

        config.apply_env_from(lookup)?;
        Ok((config, source))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup(DB_PATH_ENV) {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Some(policy) = lookup(DANGLING_REFERENCES_ENV) {
            match DanglingPolicy::parse(&policy) {
                Some(policy) => self.reconcile.dangling_references = policy,
                None => bail!(
                    "invalid {} value '{}': expected 'warn' or 'reject'",
                    DANGLING_REFERENCES_ENV,
                    policy
                ),
            }
        }

        Ok(())
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }
        Ok(())
    }
}
