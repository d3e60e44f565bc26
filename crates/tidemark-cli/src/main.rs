mod migrations;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tidemark_cli::logging::init_tracing;
use tidemark_cli::{Cli, Command, Outcome, Settings, commands, execute};
use tidemark_config::{ConfigLoader, MigrationsConfig};
use tidemark_core::DirRegistry;
use tidemark_db::SqliteLedger;

const DEMO_MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src/migrations");

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match start(cli) {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn start(cli: Cli) -> anyhow::Result<Outcome> {
    let working_dir = std::env::current_dir()?;
    let config = ConfigLoader::resolve(cli.config.as_deref(), &working_dir)?;
    init_tracing(&config.log);

    let mut settings = Settings::from_config(&config);
    settings.migrations_dir = migrations_dir(&config.migrations);

    let mut stdout = io::stdout().lock();
    if cli.command == Command::Blank {
        return Ok(commands::blank(&settings, &mut stdout));
    }

    let ledger = SqliteLedger::open(&config.database.path, &config.database.table)?;
    let registry = DirRegistry::new(
        &settings.migrations_dir,
        settings.naming.clone(),
        migrations::all(ledger.connection()),
    )?;

    Ok(execute(
        &cli.command,
        registry.registry(),
        &ledger,
        &settings,
        &mut stdout,
    ))
}

/// The configured directory, or the demo's own migrations when none is set.
fn migrations_dir(config: &MigrationsConfig) -> PathBuf {
    config
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEMO_MIGRATIONS_DIR))
}
