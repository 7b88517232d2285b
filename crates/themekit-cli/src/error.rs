//! Error handling for the ThemeKit CLI.
//!
//! `CliError` wraps the library errors and adds the CLI's own failure
//! modes. Every variant can offer an actionable hint, which is rendered as
//! miette `help` text when the process exits.

mod diagnostic;

use thiserror::Error;

use themekit_config::ConfigError;
use themekit_sync::{EngineError, RemoteError, SessionError, WatchError};

pub use diagnostic::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No usable username/password
    #[error("Credentials required: {0}")]
    Credentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local preview server errors
    #[error("Preview server error: {0}")]
    Server(String),

    #[error("{0}")]
    Custom(String),
}

impl CliError {
    /// Actionable hint for the user, when one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            CliError::Config(e) => e.hint(),
            CliError::Engine(EngineError::Config(e)) => e.hint(),
            CliError::Engine(EngineError::Session(SessionError::Connection(_))) => Some(
                "Check the host URL and your credentials (THEMEKIT_USERNAME / THEMEKIT_PASSWORD)"
                    .to_string(),
            ),
            CliError::Engine(EngineError::Watch(WatchError::Notify { .. })) => Some(
                "The OS watch limit may be exhausted; add large folders to `ignore` in themekit.toml"
                    .to_string(),
            ),
            CliError::Remote(RemoteError::InvalidHost(_)) => {
                Some("Use a full URL such as https://shop.example.com".to_string())
            }
            CliError::Credentials(_) => Some(
                "Set THEMEKIT_USERNAME and THEMEKIT_PASSWORD, or run from an interactive terminal"
                    .to_string(),
            ),
            CliError::Server(_) => {
                Some("Choose another port with --port, or omit it to skip the preview server".to_string())
            }
            _ => None,
        }
    }
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_connect_failure_has_hint() {
        let err: CliError = EngineError::Session(SessionError::Connection(
            "Invalid credentials (HTTP 401)".to_string(),
        ))
        .into();

        assert!(err.to_string().contains("Invalid credentials"));
        assert!(err.hint().unwrap().contains("THEMEKIT_USERNAME"));
    }

    #[test]
    fn test_config_hint_passes_through() {
        let err: CliError = ConfigError::MissingField {
            field: "host".to_string(),
            hint: Some("Pass --host <URL>".to_string()),
        }
        .into();

        assert_eq!(err.to_string(), "missing required setting: host");
        assert_eq!(err.hint().as_deref(), Some("Pass --host <URL>"));
    }

    #[test]
    fn test_engine_config_hint_passes_through() {
        let err: CliError =
            EngineError::Config(ConfigError::ThemeRootNotFound(PathBuf::from("missing"))).into();
        assert!(err.hint().unwrap().contains("theme directory"));
    }

    #[test]
    fn test_cli_failures_have_hints() {
        let err: CliError = RemoteError::InvalidHost("shop".to_string()).into();
        assert!(err.hint().unwrap().contains("https://"));

        let err = CliError::Server("Failed to bind to 127.0.0.1:4000".to_string());
        assert!(err.hint().unwrap().contains("--port"));

        let err: CliError = std::io::Error::other("broken pipe").into();
        assert_eq!(err.to_string(), "I/O error: broken pipe");
        assert!(err.hint().is_none());
    }
}
