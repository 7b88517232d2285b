//! File-based config discovery for CLI use
//!
//! Finds `themekit.toml` in the theme root and merges it with environment
//! variables and command-line overrides.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use tracing::debug;

use crate::dev::{DevSyncConfig, DevSyncOverrides};
use crate::error::{ConfigError, Result};

pub const CONFIG_FILE_NAME: &str = "themekit.toml";
pub const DEFAULT_ENV_PREFIX: &str = "THEMEKIT_";

/// Environment keys under the prefix that are never treated as settings.
const RESERVED_ENV_KEYS: &[&str] = &["username", "password"];

/// File-based configuration discovery
///
/// Priority: CLI overrides > environment variables > `themekit.toml` > defaults
///
/// # Example
///
/// ```no_run
/// use themekit_config::{ConfigDiscovery, DevSyncOverrides};
///
/// let discovery = ConfigDiscovery::new("./theme");
/// let config = discovery.load(None, &DevSyncOverrides::default()).unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
    env_prefix: String,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Use a different environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Find `themekit.toml` in the root directory
    pub fn find(&self) -> Option<PathBuf> {
        let path = self.root.join(CONFIG_FILE_NAME);
        path.is_file().then_some(path)
    }

    /// Load and merge every configuration source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit config path does not
    /// exist, or `ConfigError::Extract` if a source has the wrong shape.
    pub fn load(
        &self,
        explicit: Option<&Path>,
        overrides: &DevSyncOverrides,
    ) -> Result<DevSyncConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(DevSyncConfig::default()));

        let config_file = match explicit {
            Some(path) if !path.is_file() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => Some(path.to_path_buf()),
            None => self.find(),
        };

        if let Some(path) = config_file {
            debug!(path = %path.display(), "loading config file");
            figment = figment.merge(Toml::file(path));
        }

        figment = figment
            .merge(Env::prefixed(&self.env_prefix).ignore(RESERVED_ENV_KEYS))
            .merge(Serialized::defaults(overrides));

        Ok(figment.extract()?)
    }
}
