use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tidemark_common::{Error, Result, Version};
use tidemark_core::FileNaming;
use tracing::info;

const TEMPLATE: &str = r#"use tidemark_core::{Migration, MigrationContext, Version};

pub struct Migration__VERSION__;

impl Migration for Migration__VERSION__ {
    fn version(&self) -> Version {
        __VERSION__
    }

    fn up(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn down(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
        Ok(())
    }
}
"#;

/// Writes empty migration files into the migrations directory.
#[derive(Debug, Clone)]
pub struct BlankGenerator {
    dir: PathBuf,
    naming: FileNaming,
}

impl BlankGenerator {
    pub fn new(dir: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Render the source of an empty migration for `version`.
    pub fn render(version: Version) -> String {
        TEMPLATE.replace("__VERSION__", &version.to_string())
    }

    /// Create the file for `version`. Never overwrites an existing file.
    pub fn create(&self, version: Version) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(self.naming.file_name(version));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::InvalidInput(format!(
                    "migration file {} already exists",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(Self::render(version).as_bytes())?;

        info!(version, path = %path.display(), "created blank migration");
        Ok(path)
    }

    /// Create a file stamped with the current unix time in seconds.
    pub fn create_now(&self) -> Result<(Version, PathBuf)> {
        let version = Version::try_from(chrono::Utc::now().timestamp())
            .map_err(|_| Error::Other("system clock is before the unix epoch".to_string()))?;
        let path = self.create(version)?;
        Ok((version, path))
    }
}
