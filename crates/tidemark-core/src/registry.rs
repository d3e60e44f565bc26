use std::collections::HashMap;
use std::fmt;

use tidemark_common::{Error, Result, Version};
use tracing::debug;

use crate::migration::Migration;

/// In-memory catalog of migrations keyed by version.
///
/// Built once at startup from an explicit list and never mutated afterwards.
/// Ordering is computed on demand.
#[derive(Default)]
pub struct Registry {
    migrations: HashMap<Version, Box<dyn Migration>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a migration. A version that is already present is rejected and
    /// the existing entry is left untouched.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<()> {
        let version = migration.version();
        if self.migrations.contains_key(&version) {
            return Err(Error::DuplicateVersion { version });
        }
        debug!(version, "registered migration");
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Register every migration in order, stopping at the first duplicate.
    pub fn register_all<I>(&mut self, migrations: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn Migration>>,
    {
        for migration in migrations {
            self.register(migration)?;
        }
        Ok(())
    }

    pub fn ordered_versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> = self.migrations.keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    pub fn ordered_migrations(&self) -> Vec<&dyn Migration> {
        let mut migrations: Vec<&dyn Migration> =
            self.migrations.values().map(|m| &**m).collect();
        migrations.sort_unstable_by_key(|m| m.version());
        migrations
    }

    pub fn get(&self, version: Version) -> Option<&dyn Migration> {
        self.migrations.get(&version).map(|m| &**m)
    }

    pub fn contains(&self, version: Version) -> bool {
        self.migrations.contains_key(&version)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("versions", &self.ordered_versions())
            .finish()
    }
}
