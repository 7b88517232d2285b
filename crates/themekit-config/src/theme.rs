//! Theme root resolution and manifest lookup.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{ConfigError, Result};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// A theme directory that existed and was readable when it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeRoot {
    path: PathBuf,
}

impl ThemeRoot {
    /// Resolve and check the theme directory.
    ///
    /// # Errors
    ///
    /// Fails when the path does not exist, is not a directory, or cannot
    /// be listed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ThemeRootNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(ConfigError::ThemeRootNotDirectory(path.to_path_buf()));
        }

        let path = fs::canonicalize(path)?;
        // Listing proves the directory is readable before anything connects.
        fs::read_dir(&path)?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed `manifest.json`, if the theme has one.
    ///
    /// # Errors
    ///
    /// A manifest that exists but cannot be read or parsed is an error.
    pub fn manifest(&self) -> Result<Option<Value>> {
        let manifest_path = self.path.join(MANIFEST_FILE_NAME);
        if !manifest_path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&manifest_path).map_err(|e| ConfigError::InvalidManifest {
                path: manifest_path.clone(),
                reason: e.to_string(),
            })?;

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ConfigError::InvalidManifest {
                path: manifest_path,
                reason: e.to_string(),
            })
    }

    /// Theme name from an explicit value, the manifest `name`, or the
    /// directory name, in that order.
    pub fn theme_name(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(name) = explicit.filter(|n| !n.trim().is_empty()) {
            return Ok(name.to_string());
        }

        if let Some(manifest) = self.manifest()? {
            if let Some(name) = manifest.get("name").and_then(Value::as_str) {
                if !name.trim().is_empty() {
                    return Ok(name.to_string());
                }
            }
        }

        Ok(self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "theme".to_string()))
    }
}
