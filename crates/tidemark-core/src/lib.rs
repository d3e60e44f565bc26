pub mod dir_registry;
pub mod ledger;
pub mod lock;
pub mod migration;
pub mod reconcile;
pub mod registry;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use dir_registry::{DirRegistry, FileNaming, RegistryConsistency};
pub use ledger::{ExecutionLedger, InMemoryLedger};
pub use lock::{LockOptions, RunLock};
pub use migration::{CancelToken, Migration, MigrationContext};
pub use reconcile::{Plan, reconcile};
pub use registry::Registry;
pub use runner::{Halt, RunReport, Runner, Stats, Steps};
pub use tidemark_common::{Direction, Error, MigrationExecution, Result, Version};
