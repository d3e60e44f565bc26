pub mod sqlite_ledger;

pub use sqlite_ledger::{DEFAULT_TABLE, SqliteLedger, validate_table_name};
