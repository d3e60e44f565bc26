use std::fmt;
use std::str::FromStr;

use tidemark_common::{Direction, Error, MigrationExecution, Result, Version, now_ms};
use tracing::{debug, error, info, warn};

use crate::ledger::ExecutionLedger;
use crate::lock::{LockOptions, RunLock};
use crate::migration::{CancelToken, Migration, MigrationContext};
use crate::reconcile::{Plan, reconcile};
use crate::registry::Registry;

/// How many pending migrations an ordered run may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steps {
    All,
    Count(usize),
}

impl Steps {
    fn limit(self) -> usize {
        match self {
            Steps::All => usize::MAX,
            Steps::Count(n) => n,
        }
    }
}

impl FromStr for Steps {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Steps::All);
        }
        s.parse::<usize>().map(Steps::Count).map_err(|_| {
            Error::InvalidInput(format!(
                "steps must be a non-negative number or \"all\", got {s:?}"
            ))
        })
    }
}

impl fmt::Display for Steps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Steps::All => f.write_str("all"),
            Steps::Count(n) => write!(f, "{n}"),
        }
    }
}

/// The step a run stopped at and why.
#[derive(Debug)]
pub struct Halt {
    pub version: Version,
    pub error: Error,
}

/// Result of one `up`, `down`, `force:up` or `force:down` run.
#[derive(Debug)]
pub struct RunReport {
    pub direction: Direction,
    pub forced: bool,
    /// Steps that finished and were persisted, in execution order.
    pub completed: Vec<MigrationExecution>,
    pub halt: Option<Halt>,
}

impl RunReport {
    fn new(direction: Direction, forced: bool) -> Self {
        Self {
            direction,
            forced,
            completed: Vec::new(),
            halt: None,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }

    pub fn completed_versions(&self) -> Vec<Version> {
        self.completed.iter().map(|e| e.version).collect()
    }

    /// Turn a halted run into its error.
    pub fn into_result(self) -> Result<Vec<MigrationExecution>> {
        match self.halt {
            Some(halt) => Err(halt.error),
            None => Ok(self.completed),
        }
    }
}

/// Read-only summary of the registry and the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub registered: usize,
    pub executed: usize,
    pub pending_up: usize,
    pub pending_down: usize,
    /// Executed versions with no registered migration.
    pub orphaned: Vec<Version>,
    pub last_applied: Option<MigrationExecution>,
}

impl Stats {
    /// Whether ordered `up` / `down` runs are allowed.
    pub fn is_consistent(&self) -> bool {
        self.orphaned.is_empty()
    }
}

/// Drives migrations from a [`Registry`] and records them in an
/// [`ExecutionLedger`], one step at a time. Each record is persisted before
/// the next step starts and the first failing step halts the run.
///
/// Errors that prevent a run from starting are returned as `Err`. A run that
/// started and then halted returns `Ok` with [`RunReport::halt`] set.
pub struct Runner<'a> {
    registry: &'a Registry,
    ledger: &'a dyn ExecutionLedger,
    lock: Option<LockOptions>,
    cancel: CancelToken,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a Registry, ledger: &'a dyn ExecutionLedger) -> Self {
        Self {
            registry,
            ledger,
            lock: None,
            cancel: CancelToken::new(),
        }
    }

    /// Hold a host-local run lock for the duration of every operation.
    pub fn with_lock(mut self, options: LockOptions) -> Self {
        self.lock = Some(options);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run before its next step when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Apply up to `steps` pending migrations in ascending version order.
    pub fn up(&self, steps: Steps) -> Result<RunReport> {
        self.exclusive(|| {
            let plan = self.plan()?;
            plan.ensure_consistent()?;

            let versions: Vec<Version> = plan
                .pending_up()
                .iter()
                .copied()
                .take(steps.limit())
                .collect();
            info!(
                pending = plan.pending_up().len(),
                selected = versions.len(),
                %steps,
                "running migrations up"
            );
            Ok(self.run_sequence(Direction::Up, false, &versions))
        })
    }

    /// Revert up to `steps` executed migrations, newest first.
    pub fn down(&self, steps: Steps) -> Result<RunReport> {
        self.exclusive(|| {
            let plan = self.plan()?;
            plan.ensure_consistent()?;

            let versions: Vec<Version> = plan
                .pending_down()
                .iter()
                .copied()
                .take(steps.limit())
                .collect();
            info!(
                executed = plan.pending_down().len(),
                selected = versions.len(),
                %steps,
                "running migrations down"
            );
            Ok(self.run_sequence(Direction::Down, false, &versions))
        })
    }

    /// Run `up` for one version regardless of what the ledger says.
    ///
    /// This skips reconciliation and the consistency check entirely and can
    /// apply a migration twice.
    pub fn force_up(&self, version: Version) -> Result<RunReport> {
        self.forced(Direction::Up, version)
    }

    /// Run `down` for one version regardless of what the ledger says.
    ///
    /// This can revert a migration that was never applied. The record is
    /// removed on success whether or not it existed.
    pub fn force_down(&self, version: Version) -> Result<RunReport> {
        self.forced(Direction::Down, version)
    }

    /// Counts and consistency verdict. Never writes to the ledger, not even
    /// to create its storage.
    pub fn stats(&self) -> Result<Stats> {
        self.exclusive(|| {
            let plan = self.read_only_plan()?;
            Ok(Stats {
                registered: self.registry.len(),
                executed: plan.executed_count(),
                pending_up: plan.pending_up().len(),
                pending_down: plan.pending_down().len(),
                orphaned: plan.orphaned().to_vec(),
                last_applied: plan.last_applied().copied(),
            })
        })
    }

    fn forced(&self, direction: Direction, version: Version) -> Result<RunReport> {
        if !self.registry.contains(version) {
            return Err(Error::MigrationNotFound { version });
        }
        self.exclusive(|| {
            self.ledger.init()?;
            warn!(version, %direction, "forcing migration, ledger state is not consulted");
            Ok(self.run_sequence(direction, true, &[version]))
        })
    }

    fn exclusive<T>(&self, run: impl FnOnce() -> Result<T>) -> Result<T> {
        let _lock = self.lock.as_ref().map(RunLock::acquire).transpose()?;
        run()
    }

    fn plan(&self) -> Result<Plan> {
        self.ledger.init()?;
        let executions = self.ledger.load_executions()?;
        Ok(self.diff(&executions))
    }

    /// Like [`Runner::plan`], but leaves missing storage alone and treats it
    /// as an empty ledger.
    fn read_only_plan(&self) -> Result<Plan> {
        let executions = if self.ledger.exists()? {
            self.ledger.load_executions()?
        } else {
            debug!("ledger storage not created yet");
            Vec::new()
        };
        Ok(self.diff(&executions))
    }

    fn diff(&self, executions: &[MigrationExecution]) -> Plan {
        let plan = reconcile(self.registry, executions);
        debug!(
            pending_up = ?plan.pending_up(),
            pending_down = ?plan.pending_down(),
            orphaned = ?plan.orphaned(),
            "reconciled registry against ledger"
        );
        plan
    }

    fn run_sequence(&self, direction: Direction, forced: bool, versions: &[Version]) -> RunReport {
        let mut report = RunReport::new(direction, forced);

        for &version in versions {
            let step = match self.registry.get(version) {
                Some(migration) => self.step(migration, direction, forced),
                None => Err(Error::MigrationNotFound { version }),
            };

            match step {
                Ok(execution) => report.completed.push(execution),
                Err(e) => {
                    error!(version, %direction, "run halted: {e}");
                    report.halt = Some(Halt { version, error: e });
                    break;
                }
            }
        }

        if !report.is_halted() {
            info!(
                %direction,
                count = report.completed.len(),
                "migrations finished"
            );
        }
        report
    }

    fn step(
        &self,
        migration: &dyn Migration,
        direction: Direction,
        forced: bool,
    ) -> Result<MigrationExecution> {
        let version = migration.version();
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled { version });
        }

        let ctx = MigrationContext::new(version, direction, forced, self.cancel.clone());
        info!(
            version,
            %direction,
            description = migration.description(),
            "running migration"
        );

        let started_at = now_ms();
        let outcome = match direction {
            Direction::Up => migration.up(&ctx),
            Direction::Down => migration.down(&ctx),
        };
        outcome.map_err(|e| Error::StepFailed {
            version,
            direction,
            source: e.into(),
        })?;
        let execution = MigrationExecution::new(version, started_at, now_ms());

        let persisted = match direction {
            Direction::Up => self.ledger.save(&execution),
            Direction::Down => self.ledger.remove(&execution),
        };
        if let Err(e) = persisted {
            error!(
                version,
                %direction,
                "migration ran but the ledger could not be updated: {e}"
            );
            return Err(e);
        }

        info!(
            version,
            %direction,
            duration_ms = execution.duration_ms(),
            "migration completed"
        );
        Ok(execution)
    }
}
