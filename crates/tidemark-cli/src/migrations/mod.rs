use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use rusqlite::Connection;
use tidemark_core::Migration;

mod version_1712953077;
mod version_1712953080;
mod version_1712953083;

pub type SharedConnection = Arc<Mutex<Connection>>;

/// Every migration compiled into the demo. Each one needs a matching file in
/// this directory.
pub fn all(conn: SharedConnection) -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(version_1712953077::Migration1712953077::new(conn.clone())),
        Box::new(version_1712953080::Migration1712953080::new(conn.clone())),
        Box::new(version_1712953083::Migration1712953083::new(conn)),
    ]
}

fn lock(conn: &SharedConnection) -> anyhow::Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow!("database connection mutex poisoned"))
}
