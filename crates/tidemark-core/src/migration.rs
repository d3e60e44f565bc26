use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tidemark_common::{Direction, Version};

/// A versioned, reversible unit of work.
///
/// Implementations receive whatever resources they need (database handles,
/// clients) through their constructor. The version must never change once
/// the migration has been released.
pub trait Migration: Send + Sync {
    fn version(&self) -> Version;

    /// Short human-readable summary shown in logs.
    fn description(&self) -> &str {
        ""
    }

    fn up(&self, ctx: &MigrationContext) -> anyhow::Result<()>;

    fn down(&self, ctx: &MigrationContext) -> anyhow::Result<()>;
}

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Per-step information handed to [`Migration::up`] and [`Migration::down`].
#[derive(Debug, Clone)]
pub struct MigrationContext {
    version: Version,
    direction: Direction,
    forced: bool,
    cancel: CancelToken,
}

impl MigrationContext {
    pub fn new(version: Version, direction: Direction, forced: bool, cancel: CancelToken) -> Self {
        Self {
            version,
            direction,
            forced,
            cancel,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True when the step was requested through `force:up` / `force:down`.
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Long-running migrations should poll this and bail out early.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
