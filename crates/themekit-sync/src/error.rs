//! Error types for the sync engine.
//!
//! Each component has its own enum so callers can tell a fatal startup
//! failure apart from a per-change failure that only needs reporting.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single request against the remote host.
///
/// An in-band rejection (`SyncResult::success == false`) is not an error;
/// it arrives as a normal result.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{endpoint} failed with HTTP {status}: {message}")]
    Status {
        endpoint: &'static str,
        status: u16,
        message: String,
    },

    #[error("{endpoint} timed out")]
    Timeout { endpoint: &'static str },

    #[error("{endpoint} could not reach the remote host: {message}")]
    Network {
        endpoint: &'static str,
        message: String,
    },

    #[error("{endpoint} returned an unreadable response: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },

    #[error("invalid remote host URL '{0}'")]
    InvalidHost(String),
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Connect was refused or could not be completed. Never retried.
    #[error("could not start a dev session: {0}")]
    Connection(String),

    #[error("a dev session is already active")]
    AlreadyConnected,

    #[error("no active dev session")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("theme directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("failed to watch {}: {source}", .path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal engine failures. Everything else is reported and survived.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] themekit_config::ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("failed to read theme directory: {0}")]
    Io(#[from] std::io::Error),
}
