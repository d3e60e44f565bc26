use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tidemark_common::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub lock: LockConfig,
    pub log: LogConfig,
}

/// Where the execution ledger lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tidemark.db"),
            table: "migration_executions".to_string(),
        }
    }
}

/// Migration source directory and its file naming scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Unset means `migrations` in the working directory.
    pub dir: Option<PathBuf>,
    pub prefix: String,
    pub separator: String,
    pub suffix: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "version".to_string(),
            separator: "_".to_string(),
            suffix: ".rs".to_string(),
        }
    }
}

/// Host-local run lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Refuse to run while another process holds the lock.
    pub exclusive: bool,
    /// Defaults to the OS temp directory.
    pub dir: Option<PathBuf>,
    pub name: String,
    pub stale_after_secs: Option<u64>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            exclusive: true,
            dir: None,
            name: "tidemark-migrations".to_string(),
            stale_after_secs: None,
        }
    }
}

impl MigrationsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("migrations"))
    }
}

impl LockConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.database.table.trim().is_empty() {
            return Err(Error::Config("database.table cannot be empty".into()));
        }
        if self.migrations.prefix.is_empty() {
            return Err(Error::Config("migrations.prefix cannot be empty".into()));
        }
        let name = self.lock.name.trim();
        if name.is_empty() {
            return Err(Error::Config("lock.name cannot be empty".into()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Config(format!(
                "lock.name {:?} must be a plain file name",
                self.lock.name
            )));
        }
        Ok(())
    }
}
