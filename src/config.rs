//! TOML configuration for the incidentscope daemon and CLI.
//!
//! Layered: an explicit path, then the `INCIDENTSCOPE_CONFIG` environment
//! variable, then the standard system location, then compiled-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "INCIDENTSCOPE_CONFIG";
/// Standard system-wide config location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/incidentscope/incidentscope.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration.
    ///
    /// An explicitly given path must load. The environment variable and the
    /// system location are best-effort and fall through with a warning.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "INCIDENTSCOPE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; parent directories are created on open.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/incidentscope.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset (`trace` .. `error`, or directives).
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/incidentscope.db"));
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [storage]
            db_path = "/var/lib/incidentscope/db.sqlite"

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server, ServerConfig::default());
        assert_eq!(cfg.storage.db_path, PathBuf::from("/var/lib/incidentscope/db.sqlite"));
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_explicit_path_must_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::resolve(Some(&missing)).is_err());

        let path = dir.path().join("incidentscope.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:9000\"\n")?;
        let cfg = AppConfig::resolve(Some(&path))?;
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        Ok(())
    }

    #[test]
    fn test_unknown_section_is_ignored_but_bad_types_fail() {
        assert!(toml::from_str::<AppConfig>("[extra]\nfoo = 1\n").is_ok());
        assert!(toml::from_str::<AppConfig>("[logging]\njson = \"yes\"\n").is_err());
    }
}
