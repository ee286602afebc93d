//! Configuration types and parsing for upgrade.yml
//!
//! An [`UpgradeConfig`] is an explicit value passed to every engine call.
//! There is no process-wide "current database" setting; two installs managed
//! by one process simply use two configs.

use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::default_true;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the configured database path.
pub const DB_PATH_ENV: &str = "UPGRADE_DB_PATH";

/// Database location relative to the install directory when none is configured.
pub const DEFAULT_DB_RELATIVE_PATH: &str = "database/pos.db";

/// Engine configuration from upgrade.yml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeConfig {
    /// Target database file
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Install directory that `copy` steps write into
    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    /// Snapshot the database before running steps
    #[serde(default = "default_true")]
    pub backup_db: bool,

    /// Replay backups of files overwritten by `copy` steps when an apply fails
    #[serde(default = "default_true")]
    pub restore_files: bool,

    /// Parent directory for scratch and backup directories
    #[serde(default)]
    pub backup_root: Option<PathBuf>,

    /// Timeout for `script` and `command` steps, in seconds
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Interpreter used for `.py` scripts
    #[serde(default = "default_python")]
    pub python: String,

    /// Running application version, checked against `min_app_version`
    #[serde(default)]
    pub app_version: Option<String>,
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            install_dir: None,
            backup_db: true,
            restore_files: true,
            backup_root: None,
            step_timeout_secs: default_step_timeout_secs(),
            python: default_python(),
            app_version: None,
        }
    }
}

impl UpgradeConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: UpgradeConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory.
    /// Looks for upgrade.yml or upgrade.yaml and falls back to defaults.
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("upgrade.yml");
        let yaml_path = dir.join("upgrade.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            log::debug!("No upgrade.yml in {}, using defaults", dir.display());
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.step_timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "step_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.python.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "python interpreter cannot be empty".to_string(),
            });
        }
        if let Some(path) = &self.db_path {
            if path.as_os_str().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: "db_path cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Install directory, defaulting to the current working directory.
    pub fn resolve_install_dir(&self) -> std::io::Result<PathBuf> {
        match &self.install_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir(),
        }
    }

    /// Database path, defaulting to `database/pos.db` under the install dir.
    pub fn resolve_db_path(&self, install_dir: &Path) -> PathBuf {
        match &self.db_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => install_dir.join(path),
            None => install_dir.join(DEFAULT_DB_RELATIVE_PATH),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Resolve the database override from a CLI flag or the
    /// `UPGRADE_DB_PATH` env var. The CLI flag wins.
    pub fn resolve_db_override(cli_db_path: Option<&str>) -> Option<String> {
        cli_db_path
            .map(String::from)
            .or_else(|| std::env::var(DB_PATH_ENV).ok())
            .filter(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
