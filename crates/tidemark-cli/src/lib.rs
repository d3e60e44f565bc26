pub mod args;
pub mod blank;
pub mod commands;
pub mod logging;

pub use args::{Cli, Command};
pub use blank::BlankGenerator;
pub use commands::{Outcome, Settings, execute, run};
