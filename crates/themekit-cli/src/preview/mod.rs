//! Local preview server.
//!
//! Serves a page that frames the remote preview and reloads it when the
//! engine reports a successful push:
//! - `/` shell page around the remote preview URL
//! - `/__themekit/reload.js` reload client
//! - `/__themekit/events` Server-Sent Events stream of [`PreviewEvent`]s
//! - `/__themekit/status` JSON snapshot of the session

pub mod server;
pub mod state;

pub use server::PreviewServer;
pub use state::{PreviewState, PreviewStatus, SharedPreviewState};

use serde::{Deserialize, Serialize};
use themekit_sync::{EngineEvent, ReloadHint};

/// Events pushed to connected preview pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PreviewEvent {
    /// The dev session is up and the page can load this URL
    #[serde(rename_all = "camelCase")]
    Connected { preview_url: String },

    /// Files changed remotely; `hint` is `style-only` or `full`
    Reload { hint: String },

    SyncFailed { message: String },

    /// The dev session ended; no further reloads will arrive
    SessionEnded,
}

impl PreviewEvent {
    /// The preview event an engine event maps to, if any.
    ///
    /// `absolute_preview_url` replaces the remote's (often relative) URL in
    /// `Connected`.
    pub fn from_engine(event: &EngineEvent, absolute_preview_url: &str) -> Option<Self> {
        match event {
            EngineEvent::Connected { .. } => Some(PreviewEvent::Connected {
                preview_url: absolute_preview_url.to_string(),
            }),
            EngineEvent::InitialSync(outcome) if outcome.succeeded() > 0 => {
                Some(PreviewEvent::reload(outcome.reload_hint))
            }
            EngineEvent::Synced(outcome) if outcome.succeeded() > 0 => {
                Some(PreviewEvent::reload(outcome.reload_hint))
            }
            EngineEvent::Deleted(outcome) if outcome.succeeded() > 0 => {
                Some(PreviewEvent::reload(ReloadHint::Full))
            }
            EngineEvent::SyncFailed { message, .. } => Some(PreviewEvent::SyncFailed {
                message: message.clone(),
            }),
            EngineEvent::Disconnected => Some(PreviewEvent::SessionEnded),
            _ => None,
        }
    }

    fn reload(hint: ReloadHint) -> Self {
        PreviewEvent::Reload {
            hint: hint.as_str().to_string(),
        }
    }
}
