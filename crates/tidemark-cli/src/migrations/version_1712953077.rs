use tidemark_core::{Migration, MigrationContext, Version};

use super::{SharedConnection, lock};

pub struct Migration1712953077 {
    conn: SharedConnection,
}

impl Migration1712953077 {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl Migration for Migration1712953077 {
    fn version(&self) -> Version {
        1712953077
    }

    fn description(&self) -> &str {
        "create users table"
    }

    fn up(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        lock(&self.conn)?.execute_batch(
            "CREATE TABLE users (
                id    INTEGER PRIMARY KEY AUTOINCREMENT,
                name  TEXT NOT NULL,
                phone TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn down(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        lock(&self.conn)?.execute_batch("DROP TABLE users;")?;
        Ok(())
    }
}
