use std::path::{Path, PathBuf};

use tidemark_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CANDIDATE_NAMES: [&str; 3] = ["tidemark.yml", "tidemark.yaml", "tidemark.toml"];

/// Loads [`AppConfig`] from YAML or TOML files plus environment overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse `path`, choosing the format from its extension.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::parse(path, &contents)?;
        config.validate()?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    pub fn parse(path: &Path, contents: &str) -> Result<AppConfig> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yml" | "yaml" => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
            "toml" => {
                toml::from_str(contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
            }
            other => Err(Error::Config(format!(
                "unsupported config extension: {other:?}"
            ))),
        }
    }

    /// Files tried, in order, when no explicit path is given.
    pub fn candidates(working_dir: &Path) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = CANDIDATE_NAMES
            .iter()
            .map(|name| working_dir.join(name))
            .collect();
        if let Some(config_dir) = dirs::config_dir() {
            let user_dir = config_dir.join("tidemark");
            candidates.extend(CANDIDATE_NAMES.iter().map(|name| user_dir.join(name)));
        }
        candidates
    }

    /// Load `explicit` if given, otherwise the first existing candidate,
    /// otherwise defaults. Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>, working_dir: &Path) -> Result<AppConfig> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::candidates(working_dir).into_iter().find(|p| p.is_file()) {
                Some(path) => Self::load(&path)?,
                None => {
                    debug!("no config file found, using defaults");
                    AppConfig::default()
                }
            },
        };
        Self::apply_env(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TIDEMARK_*` overrides read through `lookup`.
    pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TIDEMARK_DB_PATH") {
            config.database.path = PathBuf::from(path);
        }
        if let Some(table) = lookup("TIDEMARK_DB_TABLE") {
            config.database.table = table;
        }
        if let Some(dir) = lookup("TIDEMARK_MIGRATIONS_DIR") {
            config.migrations.dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("TIDEMARK_LOCK_DIR") {
            config.lock.dir = Some(PathBuf::from(dir));
        }
        if let Some(name) = lookup("TIDEMARK_LOCK_NAME") {
            config.lock.name = name;
        }
        if let Some(raw) = lookup("TIDEMARK_EXCLUSIVE") {
            config.lock.exclusive = parse_bool(&raw).ok_or_else(|| {
                Error::Config(format!("TIDEMARK_EXCLUSIVE must be a boolean, got {raw:?}"))
            })?;
        }
        if let Some(level) = lookup("TIDEMARK_LOG") {
            config.log.level = level;
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn loads_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tidemark.yml");
        std::fs::write(
            &path,
            "database:\n  path: /var/lib/app.db\n  table: schema_log\nlock:\n  name: app\n  stale_after_secs: 600\n",
        )
        .unwrap();

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/app.db"));
        assert_eq!(config.database.table, "schema_log");
        assert_eq!(config.lock.name, "app");
        assert_eq!(config.lock.stale_after_secs, Some(600));
        assert!(config.lock.exclusive);
    }

    #[test]
    fn loads_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tidemark.toml");
        std::fs::write(
            &path,
            "[migrations]\ndir = \"db/migrations\"\nsuffix = \".sql\"\n\n[log]\njson = true\n",
        )
        .unwrap();

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.migrations.dir, Some(PathBuf::from("db/migrations")));
        assert_eq!(config.migrations.suffix, ".sql");
        assert_eq!(config.migrations.prefix, "version");
        assert!(config.log.json);
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = ConfigLoader::parse(Path::new("tidemark.ini"), "").unwrap_err();
        assert!(err.to_string().contains("unsupported config extension"));
    }

    #[test]
    fn load_validates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tidemark.yaml");
        std::fs::write(&path, "lock:\n  name: \"../escape\"\n").unwrap();
        assert!(ConfigLoader::load(&path).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("TIDEMARK_DB_PATH", "/tmp/other.db"),
            ("TIDEMARK_LOCK_NAME", "ci"),
            ("TIDEMARK_EXCLUSIVE", "off"),
            ("TIDEMARK_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        ConfigLoader::apply_env(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.lock.name, "ci");
        assert!(!config.lock.exclusive);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.database.table, "migration_executions");
    }

    #[test]
    fn env_rejects_bad_bool() {
        let mut config = AppConfig::default();
        let err = ConfigLoader::apply_env(&mut config, |k| {
            (k == "TIDEMARK_EXCLUSIVE").then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("TIDEMARK_EXCLUSIVE"));
    }

    #[test]
    fn resolve_picks_working_dir_candidate() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("tidemark.toml"),
            "[database]\ntable = \"from_candidate\"\n",
        )
        .unwrap();

        let config = ConfigLoader::resolve(None, tmp.path()).unwrap();
        assert_eq!(config.database.table, "from_candidate");
        assert_eq!(config.database.path, PathBuf::from("tidemark.db"));
    }

    #[test]
    fn resolve_prefers_explicit_path() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("tidemark.yml"), "log:\n  level: warn\n").unwrap();
        let explicit = tmp.path().join("ci.yaml");
        std::fs::write(&explicit, "log:\n  level: trace\n").unwrap();

        let config = ConfigLoader::resolve(Some(&explicit), tmp.path()).unwrap();
        assert_eq!(config.log.level, "trace");
    }

    #[test]
    fn candidates_start_in_working_dir() {
        let tmp = TempDir::new().unwrap();
        let candidates = ConfigLoader::candidates(tmp.path());
        assert_eq!(candidates[0], tmp.path().join("tidemark.yml"));
        assert_eq!(candidates[2], tmp.path().join("tidemark.toml"));
    }
}
