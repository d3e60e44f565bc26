use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tidemark_common::{Error, MigrationExecution, Result, Version};

/// Persistence port for completed migration executions.
///
/// Every method may fail with a storage error; the runner treats any such
/// failure as fatal to the step in progress.
pub trait ExecutionLedger: Send + Sync {
    /// Create the backing storage. Must succeed when it already exists.
    fn init(&self) -> Result<()>;

    /// Whether the backing storage has been created. Never creates it.
    fn exists(&self) -> Result<bool>;

    /// All persisted records, in no particular order.
    ///
    /// A scan that hits a malformed record returns [`Error::PartialScan`]
    /// carrying the records decoded before it.
    fn load_executions(&self) -> Result<Vec<MigrationExecution>>;

    /// Insert the record, or update the timestamps of an existing one.
    fn save(&self, execution: &MigrationExecution) -> Result<()>;

    /// Delete the record for `execution.version`. Removing a record that does
    /// not exist is not an error.
    fn remove(&self, execution: &MigrationExecution) -> Result<()>;

    fn find_one(&self, version: Version) -> Result<Option<MigrationExecution>>;
}

/// Non-durable ledger kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    executions: Mutex<BTreeMap<Version, MigrationExecution>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executions<I>(executions: I) -> Self
    where
        I: IntoIterator<Item = MigrationExecution>,
    {
        Self {
            executions: Mutex::new(executions.into_iter().map(|e| (e.version, e)).collect()),
        }
    }

    /// Snapshot of the stored records in ascending version order.
    pub fn snapshot(&self) -> Result<Vec<MigrationExecution>> {
        Ok(self.entries()?.values().copied().collect())
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<Version, MigrationExecution>>> {
        self.executions
            .lock()
            .map_err(|_| Error::Database("in-memory ledger lock poisoned".into()))
    }
}

impl ExecutionLedger for InMemoryLedger {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(true)
    }

    fn load_executions(&self) -> Result<Vec<MigrationExecution>> {
        self.snapshot()
    }

    fn save(&self, execution: &MigrationExecution) -> Result<()> {
        self.entries()?.insert(execution.version, *execution);
        Ok(())
    }

    fn remove(&self, execution: &MigrationExecution) -> Result<()> {
        self.entries()?.remove(&execution.version);
        Ok(())
    }

    fn find_one(&self, version: Version) -> Result<Option<MigrationExecution>> {
        Ok(self.entries()?.get(&version).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_upserts_by_version() {
        let ledger = InMemoryLedger::new();
        ledger.init().unwrap();
        ledger.init().unwrap();

        ledger.save(&MigrationExecution::new(3, 10, 20)).unwrap();
        ledger.save(&MigrationExecution::new(3, 30, 40)).unwrap();

        let all = ledger.load_executions().unwrap();
        assert_eq!(all, vec![MigrationExecution::new(3, 30, 40)]);
    }

    #[test]
    fn remove_missing_record_is_not_an_error() {
        let ledger = InMemoryLedger::new();
        ledger.remove(&MigrationExecution::for_version(42)).unwrap();
        assert!(ledger.find_one(42).unwrap().is_none());
    }

    #[test]
    fn find_one_returns_record() {
        let ledger = InMemoryLedger::with_executions([
            MigrationExecution::new(1, 1, 2),
            MigrationExecution::new(2, 3, 4),
        ]);
        assert_eq!(
            ledger.find_one(2).unwrap(),
            Some(MigrationExecution::new(2, 3, 4))
        );
        assert!(ledger.find_one(5).unwrap().is_none());

        ledger.remove(&MigrationExecution::for_version(1)).unwrap();
        assert_eq!(ledger.snapshot().unwrap().len(), 1);
    }
}
