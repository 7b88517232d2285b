//! Live sync configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevSyncConfig {
    /// Base URL of the remote storefront, e.g. `https://shop.example.com`
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub theme_name: Option<String>,

    /// Quiet window before a changed path is pushed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Time a file must go without writes before the watcher reports it
    #[serde(default = "default_stability_ms")]
    pub stability_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on how long shutdown waits for in-flight pushes
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Extra gitignore-style patterns excluded from watching and syncing
    #[serde(default)]
    pub ignore: Vec<String>,

    #[serde(default)]
    pub preview_port: Option<u16>,

    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for DevSyncConfig {
    fn default() -> Self {
        Self {
            host: None,
            theme_name: None,
            debounce_ms: default_debounce_ms(),
            stability_ms: default_stability_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            ignore: Vec::new(),
            preview_port: None,
            open: default_open(),
        }
    }
}

impl DevSyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stability(&self) -> Duration {
        Duration::from_millis(self.stability_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Host with any trailing slash removed.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` when no host was configured.
    pub fn require_host(&self) -> Result<String> {
        self.host
            .as_deref()
            .map(|h| h.trim_end_matches('/').to_string())
            .ok_or_else(|| ConfigError::MissingField {
                field: "host".to_string(),
                hint: Some(
                    "Pass --host <URL>, set THEMEKIT_HOST, or add `host` to themekit.toml"
                        .to_string(),
                ),
            })
    }

    /// Check option values that serde alone cannot reject.
    pub fn validate(&self) -> Result<()> {
        let host = self.require_host()?;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "host".to_string(),
                hint: Some(format!(
                    "'{}' must start with http:// or https://",
                    host
                )),
            });
        }

        if self.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "debounce_ms".to_string(),
                hint: Some("Use a quiet window of at least 1ms".to_string()),
            });
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                hint: Some("Requests need a bounded, non-zero timeout".to_string()),
            });
        }

        if self.preview_port == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "preview_port".to_string(),
                hint: Some("Choose a port between 1 and 65535".to_string()),
            });
        }

        Ok(())
    }
}

/// Values supplied on the command line. `None` leaves lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DevSyncOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_stability_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_open() -> bool {
    true
}
