use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tidemark_common::{Error, Result};
use tracing::{debug, warn};

/// Where the lock file lives and when an abandoned one may be reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub dir: PathBuf,
    pub name: String,
    /// Lock files older than this are treated as left behind by a dead process.
    pub stale_after: Option<Duration>,
}

impl LockOptions {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            stale_after: None,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.name))
    }

    fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::Lock(format!("invalid lock name {:?}", self.name)));
        }
        if self.name.contains(['/', '\\']) {
            return Err(Error::Lock(format!(
                "lock name {:?} must not contain path separators",
                self.name
            )));
        }
        Ok(())
    }
}

/// A held host-local run lock. The lock file is removed when this value is
/// dropped, including while unwinding from a panic.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    /// Contents written on acquire; identifies this holder on release.
    holder: String,
}

impl RunLock {
    /// Try to take the lock without waiting.
    ///
    /// Returns [`Error::Locked`] immediately when another holder has it.
    pub fn acquire(options: &LockOptions) -> Result<Self> {
        options.validate()?;
        fs::create_dir_all(&options.dir).map_err(|e| {
            Error::Lock(format!(
                "failed to create lock directory {}: {e}",
                options.dir.display()
            ))
        })?;

        let path = options.path();
        let mut reclaimed = false;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let holder = format!(
                        "pid:{}\ntime:{}\n",
                        std::process::id(),
                        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
                    );
                    if let Err(e) = file.write_all(holder.as_bytes()) {
                        let _ = fs::remove_file(&path);
                        return Err(Error::Lock(format!(
                            "failed to write lock file {}: {e}",
                            path.display()
                        )));
                    }
                    debug!("acquired run lock {}", path.display());
                    return Ok(Self { path, holder });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !reclaimed && is_stale(&path, options.stale_after) {
                        let seen = fs::read_to_string(&path).unwrap_or_default();
                        if reclaim_stale(&path, &seen)? {
                            warn!("removed stale run lock {}", path.display());
                        }
                        reclaimed = true;
                        continue;
                    }
                    return Err(Error::Locked {
                        holder: read_holder(&path),
                        path,
                    });
                }
                Err(e) => {
                    return Err(Error::Lock(format!(
                        "failed to create lock file {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents == self.holder => match fs::remove_file(&self.path) {
                Ok(()) => debug!("released run lock {}", self.path.display()),
                Err(e) => warn!("failed to release run lock {}: {e}", self.path.display()),
            },
            Ok(_) => warn!(
                "run lock {} was taken over by another holder, leaving it in place",
                self.path.display()
            ),
            Err(e) => warn!("failed to release run lock {}: {e}", self.path.display()),
        }
    }
}

/// Move a stale lock file aside and delete it only if it still holds `seen`.
/// A file that changed in between belongs to a newer holder and is put back.
fn reclaim_stale(path: &Path, seen: &str) -> Result<bool> {
    let aside = path.with_extension(format!(
        "lock.stale-{}-{}",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(Error::Lock(format!(
                "failed to move stale lock {}: {e}",
                path.display()
            )));
        }
    }

    let moved = fs::read_to_string(&aside).unwrap_or_default();
    if moved == seen {
        if let Err(e) = fs::remove_file(&aside) {
            warn!("failed to delete stale lock {}: {e}", aside.display());
        }
        return Ok(true);
    }

    // hard_link fails instead of overwriting when a new lock already exists.
    if let Err(e) = fs::hard_link(&aside, path) {
        warn!("could not restore run lock {}: {e}", path.display());
    }
    let _ = fs::remove_file(&aside);
    Ok(false)
}

fn is_stale(path: &Path, stale_after: Option<Duration>) -> bool {
    let Some(stale_after) = stale_after else {
        return false;
    };
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > stale_after)
}

fn read_holder(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => "unknown holder".to_string(),
    }
}
