use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Direction, MigrationExecution, Version};

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause of a failed migration step.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("migration {version} is already registered")]
    DuplicateVersion { version: Version },

    #[error("migration {version} is not registered")]
    MigrationNotFound { version: Version },

    #[error(
        "registry has invalid state, all migrations must be registered before running. \
         not registered: {}. extra migrations: {}",
        list_or_none(.missing),
        list_or_none(.extra)
    )]
    InconsistentRegistry {
        missing: Vec<Version>,
        extra: Vec<Version>,
    },

    #[error(
        "ledger records executions with no registered migration: {}. \
         ordered runs are refused until this is resolved",
        list_or_none(.orphaned)
    )]
    InconsistentLedger { orphaned: Vec<Version> },

    #[error("migration {version} failed during {direction}: {source}")]
    StepFailed {
        version: Version,
        direction: Direction,
        source: StepError,
    },

    #[error("run cancelled before migration {version}")]
    Cancelled { version: Version },

    #[error("database error: {0}")]
    Database(String),

    #[error("ledger scan stopped after {} record(s): {message}", .decoded.len())]
    PartialScan {
        decoded: Vec<MigrationExecution>,
        message: String,
    },

    #[error("migrations are already running: lock {} is held by {holder}", .path.display())]
    Locked { path: PathBuf, holder: String },

    #[error("lock error: {0}")]
    Lock(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

fn list_or_none(versions: &[Version]) -> String {
    if versions.is_empty() {
        return "none".to_string();
    }
    versions
        .iter()
        .map(Version::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
