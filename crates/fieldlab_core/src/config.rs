//! Engine configuration.
//!
//! # Responsibility
//! - Load store locations, catalog TTL and logging options from JSON.
//! - Apply `FIELDLAB_*` environment overrides on top of the file.
//!
//! # Invariants
//! - `catalog_ttl_secs` and `log_level` always carry a usable value.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "FIELDLAB_DB_PATH";
pub const ENV_INDEX_PATH: &str = "FIELDLAB_INDEX_PATH";
pub const ENV_CATALOG_TTL_SECS: &str = "FIELDLAB_CATALOG_TTL_SECS";
pub const ENV_LOG_LEVEL: &str = "FIELDLAB_LOG_LEVEL";

const DEFAULT_CATALOG_TTL_SECS: u64 = 30;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    /// An override or field holds an unusable value.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "cannot parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Store locations and runtime options of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Relational (EAV) database file; also the catalog store.
    pub relational_path: PathBuf,
    /// Document index database file.
    pub index_path: PathBuf,
    /// Catalog snapshot lifetime (default: 30)
    #[serde(default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: u64,
    /// Log level (default: `debug` in debug builds, `info` otherwise)
    #[serde(default = "default_level")]
    pub log_level: String,
    /// Absolute log directory; file logging stays off when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_catalog_ttl_secs() -> u64 {
    DEFAULT_CATALOG_TTL_SECS
}

fn default_level() -> String {
    default_log_level().to_string()
}

impl EngineConfig {
    pub fn new(relational_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            relational_path: relational_path.into(),
            index_path: index_path.into(),
            catalog_ttl_secs: default_catalog_ttl_secs(),
            log_level: default_level(),
            log_dir: None,
        }
    }

    /// Reads a JSON config file. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides looked up by `FIELDLAB_*` variable name.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.relational_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_INDEX_PATH) {
            self.index_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_CATALOG_TTL_SECS) {
            self.catalog_ttl_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{ENV_CATALOG_TTL_SECS} must be a whole number of seconds, got `{raw}`"
                ))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        Ok(self)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "relational_path": "/tmp/a.db", "index_path": "/tmp/b.db" }"#,
        )
        .unwrap();
        assert_eq!(config.catalog_ttl_secs, 30);
        assert_eq!(config.log_level, default_log_level());
        assert_eq!(config.log_dir, None);
        assert_eq!(config.catalog_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn overrides_replace_file_values() {
        let env = HashMap::from([
            (ENV_DB_PATH, "/data/records.db"),
            (ENV_CATALOG_TTL_SECS, " 5 "),
            (ENV_LOG_LEVEL, "warn"),
        ]);
        let config = EngineConfig::new("/tmp/a.db", "/tmp/b.db")
            .apply_overrides(|name| env.get(name).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.relational_path, PathBuf::from("/data/records.db"));
        assert_eq!(config.index_path, PathBuf::from("/tmp/b.db"));
        assert_eq!(config.catalog_ttl_secs, 5);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn invalid_ttl_override_is_rejected() {
        let error = EngineConfig::new("/tmp/a.db", "/tmp/b.db")
            .apply_overrides(|name| (name == ENV_CATALOG_TTL_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let error = EngineConfig::load("/nonexistent/fieldlab.json").unwrap_err();
        assert!(matches!(error, ConfigError::Io { .. }));
    }
}
