use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use tidemark_config::AppConfig;
use tidemark_core::{
    Direction, ExecutionLedger, FileNaming, LockOptions, Registry, RunReport, Runner, Stats,
};
use tracing::error;

use crate::args::{Cli, Command};
use crate::blank::BlankGenerator;

/// Everything a command needs besides the registry and the ledger.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` disables the run lock.
    pub lock: Option<LockOptions>,
    pub migrations_dir: PathBuf,
    pub naming: FileNaming,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        let lock = config.lock.exclusive.then(|| {
            let options = LockOptions::new(config.lock.resolved_dir(), config.lock.name.clone());
            match config.lock.stale_after_secs {
                Some(secs) => options.with_stale_after(Duration::from_secs(secs)),
                None => options,
            }
        });

        Self {
            lock,
            migrations_dir: config.migrations.resolved_dir(),
            naming: FileNaming::new(
                config.migrations.prefix.clone(),
                config.migrations.separator.clone(),
                config.migrations.suffix.clone(),
            ),
        }
    }

    fn runner<'a>(&self, registry: &'a Registry, ledger: &'a dyn ExecutionLedger) -> Runner<'a> {
        let runner = Runner::new(registry, ledger);
        match &self.lock {
            Some(lock) => runner.with_lock(lock.clone()),
            None => runner,
        }
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A run started and stopped at a failing step.
    Halted,
    /// The command could not start: lock contention, inconsistent state,
    /// unknown version, ledger failure.
    Failed,
    /// Arguments did not parse.
    Usage,
}

impl Outcome {
    pub fn code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Halted | Outcome::Failed => 1,
            Outcome::Usage => 2,
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.code())
    }
}

/// Parse `args` (including the program name) and execute the command.
pub fn run<I, T>(
    args: I,
    registry: &Registry,
    ledger: &dyn ExecutionLedger,
    settings: &Settings,
    out: &mut dyn Write,
) -> Outcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => execute(&cli.command, registry, ledger, settings, out),
        Err(e) => {
            let _ = write!(out, "{e}");
            if e.use_stderr() {
                Outcome::Usage
            } else {
                // --help and --version
                Outcome::Success
            }
        }
    }
}

/// Execute an already parsed command.
pub fn execute(
    command: &Command,
    registry: &Registry,
    ledger: &dyn ExecutionLedger,
    settings: &Settings,
    out: &mut dyn Write,
) -> Outcome {
    match dispatch(command, registry, ledger, settings, out) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "command failed");
            let _ = writeln!(out, "error: {e:#}");
            Outcome::Failed
        }
    }
}

/// Create a blank migration file. Does not need a registry or a ledger.
pub fn blank(settings: &Settings, out: &mut dyn Write) -> Outcome {
    match write_blank(settings, out) {
        Ok(()) => Outcome::Success,
        Err(e) => {
            error!(error = %e, "blank failed");
            let _ = writeln!(out, "error: {e:#}");
            Outcome::Failed
        }
    }
}

fn dispatch(
    command: &Command,
    registry: &Registry,
    ledger: &dyn ExecutionLedger,
    settings: &Settings,
    out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
    let runner = settings.runner(registry, ledger);

    let report = match command {
        Command::Up { steps } => runner.up(*steps)?,
        Command::Down { steps } => runner.down(*steps)?,
        Command::ForceUp { version } => runner.force_up(*version)?,
        Command::ForceDown { version } => runner.force_down(*version)?,
        Command::Stats => {
            let stats = runner.stats()?;
            print_stats(&stats, out)?;
            return Ok(Outcome::Success);
        }
        Command::Blank => {
            write_blank(settings, out)?;
            return Ok(Outcome::Success);
        }
    };

    print_report(&report, out)?;
    Ok(if report.is_halted() {
        Outcome::Halted
    } else {
        Outcome::Success
    })
}

fn write_blank(settings: &Settings, out: &mut dyn Write) -> anyhow::Result<()> {
    let generator = BlankGenerator::new(&settings.migrations_dir, settings.naming.clone());
    let (version, path) = generator.create_now()?;
    writeln!(out, "created {}", path.display())?;
    writeln!(
        out,
        "register Migration{version} in your migration list before running up"
    )?;
    Ok(())
}

fn print_report(report: &RunReport, out: &mut dyn Write) -> std::io::Result<()> {
    let verb = match report.direction {
        Direction::Up => "applied",
        Direction::Down => "reverted",
    };

    if report.completed.is_empty() && !report.is_halted() {
        let what = match report.direction {
            Direction::Up => "apply",
            Direction::Down => "revert",
        };
        return writeln!(out, "nothing to {what}");
    }

    for execution in &report.completed {
        writeln!(
            out,
            "{verb} {} ({} ms)",
            execution.version,
            execution.duration_ms()
        )?;
    }

    if let Some(halt) = &report.halt {
        writeln!(out, "halted at {}: {}", halt.version, halt.error)?;
    }
    Ok(())
}

fn print_stats(stats: &Stats, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "registered:    {}", stats.registered)?;
    writeln!(out, "executed:      {}", stats.executed)?;
    writeln!(out, "pending up:    {}", stats.pending_up)?;
    writeln!(out, "pending down:  {}", stats.pending_down)?;

    match &stats.last_applied {
        Some(last) => writeln!(
            out,
            "last applied:  {} at {}",
            last.version,
            format_ms(last.finished_at_ms)
        )?,
        None => writeln!(out, "last applied:  none")?,
    }

    if stats.is_consistent() {
        writeln!(out, "consistency:   ok")
    } else {
        let orphaned: Vec<String> = stats.orphaned.iter().map(|v| v.to_string()).collect();
        writeln!(
            out,
            "consistency:   orphaned executions {}",
            orphaned.join(", ")
        )
    }
}

fn format_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("{ms} ms"))
}
