use tidemark_core::{Migration, MigrationContext, Version};

use super::{SharedConnection, lock};

pub struct Migration1712953080 {
    conn: SharedConnection,
}

impl Migration1712953080 {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl Migration for Migration1712953080 {
    fn version(&self) -> Version {
        1712953080
    }

    fn description(&self) -> &str {
        "rename users.phone to phone_num"
    }

    fn up(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        lock(&self.conn)?.execute_batch("ALTER TABLE users RENAME COLUMN phone TO phone_num;")?;
        Ok(())
    }

    fn down(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        lock(&self.conn)?.execute_batch("ALTER TABLE users RENAME COLUMN phone_num TO phone;")?;
        Ok(())
    }
}
