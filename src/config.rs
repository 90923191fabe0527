//! Planner configuration from `config.toml`.
//!
//! ```toml
//! dialect = "mariadb"
//! max_page_size = 100
//! default_page_size = 20
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::dialect::DialectName;
use crate::error::{PlanError, PlanResult};
use crate::pagination::interpret::PagingSettings;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "JOINPLAN_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    pub dialect: DialectName,
    pub max_page_size: Option<u64>,
    pub default_page_size: Option<u64>,
}

impl PlannerConfig {
    pub fn from_toml(content: &str) -> PlanResult<Self> {
        let config: PlannerConfig =
            toml::from_str(content).map_err(|e| PlanError::Config(e.to_string()))?;
        if let (Some(default), Some(max)) = (config.default_page_size, config.max_page_size) {
            if default > max {
                return Err(PlanError::Config(format!(
                    "default_page_size ({}) exceeds max_page_size ({})",
                    default, max
                )));
            }
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PlanResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `path`, else `$JOINPLAN_CONFIG`, else the user config directory.
    ///
    /// A missing file at the user config location yields the defaults; a missing
    /// file that was named explicitly is an error.
    pub fn load(path: Option<&Path>) -> PlanResult<Self> {
        if let Some(path) = path {
            debug!(path = %path.display(), "loading config");
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            debug!(%path, "loading config from {}", CONFIG_ENV);
            return Self::from_file(Path::new(&path));
        }
        match default_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading config");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn settings(&self) -> PagingSettings {
        PagingSettings {
            max_page_size: self.max_page_size,
            default_page_size: self.default_page_size,
        }
    }
}

/// `<config dir>/joinplan/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("joinplan").join("config.toml"))
}
