use std::sync::{Arc, Mutex};

use anyhow::bail;
use tidemark_common::{Direction, Error, MigrationExecution, Result, Version};

use crate::ledger::{ExecutionLedger, InMemoryLedger};
use crate::migration::{Migration, MigrationContext};
use crate::registry::Registry;

pub type CallLog = Arc<Mutex<Vec<(Direction, Version)>>>;

pub struct TestMigration {
    version: Version,
    description: String,
    calls: CallLog,
    fail_up: bool,
    fail_down: bool,
}

impl TestMigration {
    pub fn new(version: Version, calls: &CallLog) -> Self {
        Self {
            version,
            description: format!("test migration {version}"),
            calls: Arc::clone(calls),
            fail_up: false,
            fail_down: false,
        }
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    pub fn failing_down(mut self) -> Self {
        self.fail_down = true;
        self
    }
}

impl Migration for TestMigration {
    fn version(&self) -> Version {
        self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn up(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push((Direction::Up, self.version));
        if self.fail_up {
            bail!("up of {} exploded", self.version);
        }
        Ok(())
    }

    fn down(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push((Direction::Down, self.version));
        if self.fail_down {
            bail!("down of {} exploded", self.version);
        }
        Ok(())
    }
}

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<(Direction, Version)> {
    log.lock().unwrap().clone()
}

pub fn registry_of(versions: &[Version], log: &CallLog) -> Registry {
    let mut registry = Registry::new();
    for version in versions {
        registry
            .register(Box::new(TestMigration::new(*version, log)))
            .unwrap();
    }
    registry
}

pub fn ledger_with(versions: &[Version]) -> InMemoryLedger {
    InMemoryLedger::with_executions(
        versions
            .iter()
            .map(|v| MigrationExecution::new(*v, v * 10, v * 10 + 1)),
    )
}

/// Ledger whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    pub fail_save: bool,
    pub fail_remove: bool,
    pub fail_load: bool,
    pub fail_init: bool,
}

impl ExecutionLedger for FlakyLedger {
    fn init(&self) -> Result<()> {
        if self.fail_init {
            return Err(Error::Database("read-only storage".into()));
        }
        self.inner.init()
    }

    fn exists(&self) -> Result<bool> {
        self.inner.exists()
    }

    fn load_executions(&self) -> Result<Vec<MigrationExecution>> {
        if self.fail_load {
            return Err(Error::Database("connection refused".into()));
        }
        self.inner.load_executions()
    }

    fn save(&self, execution: &MigrationExecution) -> Result<()> {
        if self.fail_save {
            return Err(Error::Database("write rejected".into()));
        }
        self.inner.save(execution)
    }

    fn remove(&self, execution: &MigrationExecution) -> Result<()> {
        if self.fail_remove {
            return Err(Error::Database("delete rejected".into()));
        }
        self.inner.remove(execution)
    }

    fn find_one(&self, version: Version) -> Result<Option<MigrationExecution>> {
        self.inner.find_one(version)
    }
}
