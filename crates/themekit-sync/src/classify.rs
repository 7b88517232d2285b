//! Content classification and checksumming for sync units.
//!
//! Encoding is chosen from the file extension alone; content is never
//! sniffed.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Extensions sent as base64. Everything else travels as UTF-8 text.
pub const BINARY_EXTENSIONS: &[&str] = &[
    // Images
    "png", "jpg", "jpeg", "gif", "webp", "avif", "bmp", "tif", "tiff",
    // Icons
    "ico", "cur",
    // Fonts
    "woff", "woff2", "ttf", "otf", "eot",
];

/// Wire encoding of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

impl Encoding {
    /// Encoding for a path, decided by its lowercase extension.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        let is_binary = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                BINARY_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false);

        if is_binary {
            Encoding::Base64
        } else {
            Encoding::Utf8
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Base64 => "base64",
        }
    }
}

/// Result of classifying a file's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedContent {
    pub content: String,
    pub checksum: String,
    pub encoding: Encoding,
}

/// Lowercase hex SHA-256 over the raw bytes.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Classify a file and encode its content for the wire.
///
/// Never fails: text that is not valid UTF-8 is converted lossily, while
/// the checksum still covers the original bytes.
pub fn classify(path: impl AsRef<Path>, bytes: &[u8]) -> ClassifiedContent {
    let encoding = Encoding::for_path(path);
    let checksum = checksum(bytes);

    let content = match encoding {
        Encoding::Base64 => STANDARD.encode(bytes),
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
    };

    ClassifiedContent {
        content,
        checksum,
        encoding,
    }
}

/// A single file's content sync unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Slash-separated path relative to the theme root
    pub path: String,
    pub content: String,
    pub checksum: String,
    pub encoding: Encoding,
}

impl FileChange {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        let path = path.into();
        let ClassifiedContent {
            content,
            checksum,
            encoding,
        } = classify(&path, bytes);

        Self {
            path,
            content,
            checksum,
            encoding,
        }
    }

    /// Decode the wire content back into raw bytes.
    pub fn decoded(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.encoding {
            Encoding::Utf8 => Ok(self.content.clone().into_bytes()),
            Encoding::Base64 => STANDARD.decode(&self.content),
        }
    }
}
