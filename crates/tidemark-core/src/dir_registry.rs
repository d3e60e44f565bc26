use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tidemark_common::{Error, Result, Version};
use tracing::{debug, error};

use crate::migration::Migration;
use crate::registry::Registry;

/// File naming scheme: `prefix` + `separator` + decimal version + `suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    pub prefix: String,
    pub separator: String,
    pub suffix: String,
}

impl Default for FileNaming {
    fn default() -> Self {
        Self {
            prefix: "version".to_string(),
            separator: "_".to_string(),
            suffix: ".rs".to_string(),
        }
    }
}

impl FileNaming {
    pub fn new(
        prefix: impl Into<String>,
        separator: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            suffix: suffix.into(),
        }
    }

    pub fn file_name(&self, version: Version) -> String {
        format!("{}{}{}{}", self.prefix, self.separator, version, self.suffix)
    }

    /// Extract the version from a file name following this scheme.
    pub fn parse(&self, file_name: &str) -> Option<Version> {
        let digits = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(self.separator.as_str())?
            .strip_suffix(self.suffix.as_str())?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// Outcome of comparing registered versions against declared files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConsistency {
    /// Declared by a file but not registered.
    pub missing: Vec<Version>,
    /// Registered but without a declaring file.
    pub extra: Vec<Version>,
}

impl RegistryConsistency {
    /// Compare both sets in one pass; both output lists are sorted ascending.
    pub fn compare<R, D>(registered: R, declared: D) -> Self
    where
        R: IntoIterator<Item = Version>,
        D: IntoIterator<Item = Version>,
    {
        let registered: BTreeSet<Version> = registered.into_iter().collect();
        let declared: BTreeSet<Version> = declared.into_iter().collect();

        Self {
            missing: declared.difference(&registered).copied().collect(),
            extra: registered.difference(&declared).copied().collect(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    pub fn missing_files(&self, naming: &FileNaming) -> Vec<String> {
        self.missing.iter().map(|v| naming.file_name(*v)).collect()
    }

    pub fn extra_files(&self, naming: &FileNaming) -> Vec<String> {
        self.extra.iter().map(|v| naming.file_name(*v)).collect()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(Error::InconsistentRegistry {
            missing: self.missing,
            extra: self.extra,
        })
    }
}

/// Collect the versions declared by the files in `dir`.
///
/// Subdirectories and names that do not follow `naming` are skipped.
pub fn declared_versions(dir: &Path, naming: &FileNaming) -> Result<BTreeSet<Version>> {
    let read_err = |e: io::Error| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("failed to read migrations directory {}: {e}", dir.display()),
        ))
    };

    let mut versions = BTreeSet::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(version) = naming.parse(name) {
            versions.insert(version);
        }
    }
    Ok(versions)
}

/// A [`Registry`] whose contents must match the migration files in a directory.
#[derive(Debug)]
pub struct DirRegistry {
    registry: Registry,
    dir: PathBuf,
    naming: FileNaming,
}

impl DirRegistry {
    /// An empty registry for `dir`, to be filled with [`DirRegistry::register`].
    pub fn empty(dir: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            registry: Registry::new(),
            dir: dir.into(),
            naming,
        }
    }

    /// Register every migration, then verify the result against `dir`.
    ///
    /// Fails on the first duplicate version, on an unreadable directory, and
    /// when the registered and declared sets differ.
    pub fn new<I>(dir: impl Into<PathBuf>, naming: FileNaming, migrations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Box<dyn Migration>>,
    {
        let mut registry = Self::empty(dir, naming);
        registry.registry.register_all(migrations)?;
        registry.assert_valid()?;
        Ok(registry)
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<()> {
        self.registry.register(migration)
    }

    pub fn check(&self) -> Result<RegistryConsistency> {
        let declared = declared_versions(&self.dir, &self.naming)?;
        let consistency = RegistryConsistency::compare(self.registry.ordered_versions(), declared);
        debug!(
            dir = %self.dir.display(),
            missing = consistency.missing.len(),
            extra = consistency.extra.len(),
            "checked migrations directory"
        );
        Ok(consistency)
    }

    pub fn assert_valid(&self) -> Result<()> {
        let consistency = self.check()?;
        if !consistency.is_consistent() {
            error!(
                not_registered = %consistency.missing_files(&self.naming).join(", "),
                extra = %consistency.extra_files(&self.naming).join(", "),
                "registered migrations do not match {}",
                self.dir.display()
            );
        }
        consistency.into_result()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn naming(&self) -> &FileNaming {
        &self.naming
    }
}
