use std::collections::BTreeMap;

use tidemark_common::{Error, MigrationExecution, Result, Version};

use crate::registry::Registry;

/// Difference between the registry and the ledger at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pending_up: Vec<Version>,
    pending_down: Vec<Version>,
    orphaned: Vec<Version>,
    executed: BTreeMap<Version, MigrationExecution>,
}

/// Compare registered migrations against persisted executions.
///
/// - pending up: registered, not executed; ascending
/// - pending down: executed and registered; descending
/// - orphaned: executed but not registered; ascending
pub fn reconcile(registry: &Registry, executions: &[MigrationExecution]) -> Plan {
    let executed: BTreeMap<Version, MigrationExecution> =
        executions.iter().map(|e| (e.version, *e)).collect();

    let pending_up = registry
        .ordered_versions()
        .into_iter()
        .filter(|v| !executed.contains_key(v))
        .collect();

    let (mut pending_down, orphaned): (Vec<Version>, Vec<Version>) =
        executed.keys().copied().partition(|v| registry.contains(*v));
    pending_down.reverse();

    Plan {
        pending_up,
        pending_down,
        orphaned,
        executed,
    }
}

impl Plan {
    pub fn pending_up(&self) -> &[Version] {
        &self.pending_up
    }

    pub fn pending_down(&self) -> &[Version] {
        &self.pending_down
    }

    /// Executed versions whose migration is not registered.
    pub fn orphaned(&self) -> &[Version] {
        &self.orphaned
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub fn execution(&self, version: Version) -> Option<&MigrationExecution> {
        self.executed.get(&version)
    }

    /// The registered execution with the highest version.
    pub fn last_applied(&self) -> Option<&MigrationExecution> {
        self.pending_down.first().and_then(|v| self.executed.get(v))
    }

    pub fn is_consistent(&self) -> bool {
        self.orphaned.is_empty()
    }

    /// Refuse ordered runs while the ledger references unknown migrations.
    pub fn ensure_consistent(&self) -> Result<()> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(Error::InconsistentLedger {
            orphaned: self.orphaned.clone(),
        })
    }
}
