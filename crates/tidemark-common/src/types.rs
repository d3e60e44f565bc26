use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Migration version identifier, conventionally a unix timestamp in seconds.
pub type Version = u64;

/// Which half of a migration is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// A persisted record of one completed migration.
///
/// Created when a migration's `up` succeeds and removed when its `down`
/// succeeds. `executed_at_ms <= finished_at_ms` always holds for records
/// produced by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationExecution {
    pub version: Version,
    pub executed_at_ms: u64,
    pub finished_at_ms: u64,
}

impl MigrationExecution {
    pub fn new(version: Version, executed_at_ms: u64, finished_at_ms: u64) -> Self {
        Self {
            version,
            executed_at_ms,
            finished_at_ms: finished_at_ms.max(executed_at_ms),
        }
    }

    /// A record carrying only the version, used for removals.
    pub fn for_version(version: Version) -> Self {
        Self {
            version,
            executed_at_ms: 0,
            finished_at_ms: 0,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at_ms.saturating_sub(self.executed_at_ms)
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
