use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tidemark_core::{Steps, Version};

/// Apply, revert and inspect versioned migrations.
#[derive(Parser, Debug)]
#[command(name = "tidemark", version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML or TOML configuration file
    #[arg(long, global = true, env = "TIDEMARK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply pending migrations, lowest version first
    Up {
        /// Number of migrations to apply, or "all"
        #[arg(long, default_value = "all", value_parser = parse_steps)]
        steps: Steps,
    },

    /// Revert applied migrations, highest version first
    Down {
        /// Number of migrations to revert, or "all"
        #[arg(long, default_value = "1", value_parser = parse_steps)]
        steps: Steps,
    },

    /// Run one migration's up regardless of recorded state (destructive)
    #[command(name = "force:up")]
    ForceUp {
        /// Version of the migration to apply
        #[arg(long)]
        version: Version,
    },

    /// Run one migration's down regardless of recorded state (destructive)
    #[command(name = "force:down")]
    ForceDown {
        /// Version of the migration to revert
        #[arg(long)]
        version: Version,
    },

    /// Create an empty migration file stamped with the current time
    Blank,

    /// Show registered, executed and pending counts
    Stats,
}

fn parse_steps(raw: &str) -> Result<Steps, String> {
    raw.parse::<Steps>().map_err(|e| e.to_string())
}
