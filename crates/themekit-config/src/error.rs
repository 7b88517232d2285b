//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("theme directory not found: {}", .0.display())]
    ThemeRootNotFound(PathBuf),

    #[error("theme path is not a directory: {}", .0.display())]
    ThemeRootNotDirectory(PathBuf),

    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("missing required setting: {field}")]
    MissingField { field: String, hint: Option<String> },

    #[error("invalid config value for '{field}'")]
    InvalidValue { field: String, hint: Option<String> },

    #[error("unreadable manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("failed to merge configuration sources: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Actionable hint for the user, when one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            ConfigError::ThemeRootNotFound(_) => {
                Some("Pass the theme directory as the first argument".to_string())
            }
            ConfigError::NotFound(_) => {
                Some("Create a themekit.toml file or omit --config".to_string())
            }
            ConfigError::MissingField { hint, .. } | ConfigError::InvalidValue { hint, .. } => {
                hint.clone()
            }
            ConfigError::InvalidManifest { .. } => {
                Some("manifest.json must be valid JSON".to_string())
            }
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_carries_hint() {
        let err = ConfigError::MissingField {
            field: "host".to_string(),
            hint: Some("Pass --host".to_string()),
        };
        assert_eq!(err.to_string(), "missing required setting: host");
        assert_eq!(err.hint().as_deref(), Some("Pass --host"));
    }

    #[test]
    fn root_not_found_mentions_path() {
        let err = ConfigError::ThemeRootNotFound(PathBuf::from("/themes/dawn"));
        assert!(err.to_string().contains("/themes/dawn"));
        assert!(err.hint().is_some());
    }
}
