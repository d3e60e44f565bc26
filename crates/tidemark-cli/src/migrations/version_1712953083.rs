use tidemark_core::{Migration, MigrationContext, Version};

use super::{SharedConnection, lock};

const SEED: [(&str, &str); 3] = [
    ("Alex", "+1 555 0100"),
    ("Jada", "+1 555 0101"),
    ("Tia", "+1 555 0102"),
];

pub struct Migration1712953083 {
    conn: SharedConnection,
}

impl Migration1712953083 {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl Migration for Migration1712953083 {
    fn version(&self) -> Version {
        1712953083
    }

    fn description(&self) -> &str {
        "seed users"
    }

    fn up(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        for (name, phone) in SEED {
            tx.execute(
                "INSERT INTO users (name, phone_num) VALUES (?1, ?2)",
                (name, phone),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn down(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        for (name, _) in SEED {
            tx.execute("DELETE FROM users WHERE name = ?1", [name])?;
        }
        tx.commit()?;
        Ok(())
    }
}
