use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row, params};
use tidemark_common::{Error, MigrationExecution, Result, Version};
use tidemark_core::ExecutionLedger;
use tracing::{debug, info};

pub const DEFAULT_TABLE: &str = "migration_executions";

/// Execution ledger stored in a SQLite table.
///
/// The connection can be shared with the host's migrations through
/// [`SqliteLedger::connection`], so ledger writes and schema changes go to the
/// same database.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteLedger {
    pub fn open(db_path: &Path, table: &str) -> Result<Self> {
        info!("opening execution ledger at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Self::with_connection(Arc::new(Mutex::new(conn)), table)
    }

    pub fn in_memory(table: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::with_connection(Arc::new(Mutex::new(conn)), table)
    }

    /// Use an already open connection, typically the one the host's
    /// migrations run against.
    pub fn with_connection(conn: Arc<Mutex<Connection>>, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("execution ledger lock poisoned".into()))
    }
}

impl ExecutionLedger for SqliteLedger {
    fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                version INTEGER PRIMARY KEY NOT NULL,
                executed_at_ms INTEGER NOT NULL,
                finished_at_ms INTEGER NOT NULL
            );",
            self.table
        ))
        .map_err(|e| Error::Database(format!("failed to create ledger table: {e}")))?;
        debug!(table = %self.table, "execution ledger ready");
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![self.table],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to inspect ledger table: {e}")))
    }

    fn load_executions(&self) -> Result<Vec<MigrationExecution>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT version, executed_at_ms, finished_at_ms FROM \"{}\"",
                self.table
            ))
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let mut rows = stmt
            .query([])
            .map_err(|e| Error::Database(format!("failed to query executions: {e}")))?;

        let mut decoded = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    return Err(Error::PartialScan {
                        decoded,
                        message: format!("failed to read execution row: {e}"),
                    });
                }
            };
            match decode_row(row) {
                Ok(execution) => decoded.push(execution),
                Err(message) => return Err(Error::PartialScan { decoded, message }),
            }
        }
        Ok(decoded)
    }

    fn save(&self, execution: &MigrationExecution) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO \"{}\" (version, executed_at_ms, finished_at_ms)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(version) DO UPDATE SET
                    executed_at_ms = excluded.executed_at_ms,
                    finished_at_ms = excluded.finished_at_ms",
                self.table
            ),
            params![
                version_to_sql(execution.version),
                to_sql_int(execution.executed_at_ms, "executed_at_ms")?,
                to_sql_int(execution.finished_at_ms, "finished_at_ms")?,
            ],
        )
        .map_err(|e| Error::Database(format!("failed to save execution: {e}")))?;
        Ok(())
    }

    fn remove(&self, execution: &MigrationExecution) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("DELETE FROM \"{}\" WHERE version = ?1", self.table),
            params![version_to_sql(execution.version)],
        )
        .map_err(|e| Error::Database(format!("failed to remove execution: {e}")))?;
        Ok(())
    }

    fn find_one(&self, version: Version) -> Result<Option<MigrationExecution>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT version, executed_at_ms, finished_at_ms FROM \"{}\" WHERE version = ?1",
                    self.table
                ),
                params![version_to_sql(version)],
                |row| Ok(decode_row(row)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to find execution: {e}")))?;

        match raw {
            None => Ok(None),
            Some(Ok(execution)) => Ok(Some(execution)),
            Some(Err(message)) => Err(Error::Database(message)),
        }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || table.len() > 64 {
        return Err(Error::InvalidInput(format!(
            "ledger table name {table:?} must be an identifier of at most 64 letters, digits or underscores"
        )));
    }
    Ok(())
}

fn decode_row(row: &Row<'_>) -> std::result::Result<MigrationExecution, String> {
    let raw = |idx: usize, name: &str| -> std::result::Result<i64, String> {
        row.get(idx)
            .map_err(|e| format!("malformed {name} column: {e}"))
    };
    let timestamp = |idx: usize, name: &str| -> std::result::Result<u64, String> {
        let value = raw(idx, name)?;
        u64::try_from(value)
            .map_err(|_| format!("malformed {name} column: negative value {value}"))
    };

    Ok(MigrationExecution {
        version: version_from_sql(raw(0, "version")?),
        executed_at_ms: timestamp(1, "executed_at_ms")?,
        finished_at_ms: timestamp(2, "finished_at_ms")?,
    })
}

// Versions span the whole u64 range and are stored bit-for-bit in SQLite's
// signed INTEGER. The core sorts versions itself, never relying on SQL order.
fn version_to_sql(version: Version) -> i64 {
    version as i64
}

fn version_from_sql(raw: i64) -> Version {
    raw as u64
}

fn to_sql_int(value: u64, name: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("{name} {value} does not fit in a SQLite integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tidemark_core::{Migration, MigrationContext, Registry, Runner, Steps};

    struct CountingMigration {
        version: Version,
        ups: Arc<AtomicUsize>,
    }

    impl Migration for CountingMigration {
        fn version(&self) -> Version {
            self.version
        }

        fn up(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
            self.ups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn down(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn table_count(ledger: &SqliteLedger) -> i64 {
        ledger
            .connection()
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn ledger() -> SqliteLedger {
        let ledger = SqliteLedger::in_memory(DEFAULT_TABLE).unwrap();
        ledger.init().unwrap();
        ledger
    }

    #[test]
    fn init_is_idempotent() {
        let ledger = ledger();
        ledger.init().unwrap();
        ledger.init().unwrap();
        assert!(ledger.load_executions().unwrap().is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let ledger = ledger();
        ledger.save(&MigrationExecution::new(1712953077, 100, 150)).unwrap();
        ledger.save(&MigrationExecution::new(1712953080, 200, 260)).unwrap();

        let mut all = ledger.load_executions().unwrap();
        all.sort_by_key(|e| e.version);
        assert_eq!(
            all,
            vec![
                MigrationExecution::new(1712953077, 100, 150),
                MigrationExecution::new(1712953080, 200, 260),
            ]
        );
    }

    #[test]
    fn save_updates_existing_record() {
        let ledger = ledger();
        ledger.save(&MigrationExecution::new(5, 100, 150)).unwrap();
        ledger.save(&MigrationExecution::new(5, 300, 320)).unwrap();

        assert_eq!(ledger.load_executions().unwrap().len(), 1);
        assert_eq!(
            ledger.find_one(5).unwrap(),
            Some(MigrationExecution::new(5, 300, 320))
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let ledger = ledger();
        ledger.save(&MigrationExecution::new(5, 1, 2)).unwrap();

        ledger.remove(&MigrationExecution::for_version(5)).unwrap();
        ledger.remove(&MigrationExecution::for_version(5)).unwrap();
        assert!(ledger.find_one(5).unwrap().is_none());
    }

    #[test]
    fn find_missing_returns_none() {
        let ledger = ledger();
        assert!(ledger.find_one(123).unwrap().is_none());
    }

    #[test]
    fn malformed_row_returns_partial_scan() {
        let ledger = ledger();
        ledger.save(&MigrationExecution::new(1, 10, 20)).unwrap();
        {
            let conn = ledger.connection();
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO migration_executions VALUES (2, -5, 20)",
                [],
            )
            .unwrap();
        }

        match ledger.load_executions().unwrap_err() {
            Error::PartialScan { decoded, message } => {
                assert_eq!(decoded, vec![MigrationExecution::new(1, 10, 20)]);
                assert!(message.contains("executed_at_ms"));
            }
            other => panic!("expected PartialScan, got {other:?}"),
        }
    }

    #[test]
    fn load_before_init_is_a_database_error() {
        let ledger = SqliteLedger::in_memory(DEFAULT_TABLE).unwrap();
        assert!(matches!(
            ledger.load_executions().unwrap_err(),
            Error::Database(_)
        ));
    }

    #[test]
    fn rejects_unsafe_table_names() {
        for name in ["", "1table", "drop table x;", "a-b", "t\"x"] {
            assert!(SqliteLedger::in_memory(name).is_err(), "name {name:?}");
        }
        assert!(validate_table_name("_tidemark_v2").is_ok());
    }

    #[test]
    fn full_version_range_round_trips() {
        let ledger = ledger();
        let high = i64::MAX as u64 + 1;
        for version in [0, high, u64::MAX] {
            ledger.save(&MigrationExecution::new(version, 1, 2)).unwrap();
        }

        let mut all: Vec<Version> = ledger
            .load_executions()
            .unwrap()
            .iter()
            .map(|e| e.version)
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, high, u64::MAX]);
        assert_eq!(
            ledger.find_one(u64::MAX).unwrap(),
            Some(MigrationExecution::new(u64::MAX, 1, 2))
        );

        ledger.remove(&MigrationExecution::for_version(high)).unwrap();
        assert!(ledger.find_one(high).unwrap().is_none());
        assert_eq!(ledger.load_executions().unwrap().len(), 2);
    }

    #[test]
    fn timestamps_beyond_i64_are_rejected() {
        let ledger = ledger();
        let err = ledger
            .save(&MigrationExecution::new(1, u64::MAX, u64::MAX))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(ledger.find_one(1).unwrap().is_none());
    }

    #[test]
    fn shared_connection_sees_ledger_table() {
        let ledger = ledger();
        ledger.save(&MigrationExecution::new(9, 1, 2)).unwrap();

        let conn = ledger.connection();
        let count: i64 = conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM migration_executions", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.db");
        {
            let ledger = SqliteLedger::open(&path, "custom_ledger").unwrap();
            ledger.init().unwrap();
            ledger.save(&MigrationExecution::new(3, 1, 2)).unwrap();
        }

        let ledger = SqliteLedger::open(&path, "custom_ledger").unwrap();
        ledger.init().unwrap();
        assert_eq!(
            ledger.find_one(3).unwrap(),
            Some(MigrationExecution::new(3, 1, 2))
        );
    }

    #[test]
    fn exists_reflects_init() {
        let ledger = SqliteLedger::in_memory(DEFAULT_TABLE).unwrap();
        assert!(!ledger.exists().unwrap());
        ledger.init().unwrap();
        assert!(ledger.exists().unwrap());
    }

    #[test]
    fn stats_leaves_fresh_database_untouched() {
        let ledger = SqliteLedger::in_memory(DEFAULT_TABLE).unwrap();
        let ups = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register(Box::new(CountingMigration {
                version: 7,
                ups: Arc::clone(&ups),
            }))
            .unwrap();

        assert_eq!(table_count(&ledger), 0);
        let stats = Runner::new(&registry, &ledger).stats().unwrap();

        assert_eq!(table_count(&ledger), 0);
        assert_eq!(stats.executed, 0);
        assert_eq!(stats.pending_up, 1);
        assert_eq!(ups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn high_version_is_recorded_once() {
        let ledger = SqliteLedger::in_memory(DEFAULT_TABLE).unwrap();
        let version = i64::MAX as u64 + 1;
        let ups = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register(Box::new(CountingMigration {
                version,
                ups: Arc::clone(&ups),
            }))
            .unwrap();
        let runner = Runner::new(&registry, &ledger);

        let first = runner.up(Steps::All).unwrap();
        assert!(!first.is_halted());
        assert_eq!(first.completed_versions(), vec![version]);

        let second = runner.up(Steps::All).unwrap();
        assert!(!second.is_halted());
        assert!(second.completed.is_empty());

        assert_eq!(ups.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.find_one(version).unwrap().map(|e| e.version), Some(version));
    }
}
