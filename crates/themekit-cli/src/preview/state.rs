//! Shared state for the preview server.
//!
//! Tracks the session status shown by `/__themekit/status` and the SSE
//! clients that receive [`PreviewEvent`]s.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::PreviewEvent;

/// Session status as seen by the preview page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewStatus {
    Connecting,
    Live,
    Ended,
}

/// Connected SSE clients, keyed by id.
pub type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

const CLIENT_BUFFER: usize = 64;

pub struct PreviewState {
    host: String,
    preview_url: RwLock<Option<String>>,
    status: RwLock<PreviewStatus>,
    last_error: RwLock<Option<String>>,
    reloads: AtomicUsize,
    clients: ClientRegistry,
    next_client_id: AtomicUsize,
}

impl PreviewState {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            preview_url: RwLock::new(None),
            status: RwLock::new(PreviewStatus::Connecting),
            last_error: RwLock::new(None),
            reloads: AtomicUsize::new(0),
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: AtomicUsize::new(0),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn preview_url(&self) -> Option<String> {
        self.preview_url.read().clone()
    }

    pub fn status(&self) -> PreviewStatus {
        *self.status.read()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Fold an event into the status, then send it to every client.
    ///
    /// Clients whose buffer is full or whose stream has closed are dropped.
    pub fn publish(&self, event: &PreviewEvent) {
        match event {
            PreviewEvent::Connected { preview_url } => {
                *self.preview_url.write() = Some(preview_url.clone());
                *self.status.write() = PreviewStatus::Live;
            }
            PreviewEvent::Reload { .. } => {
                self.reloads.fetch_add(1, Ordering::Relaxed);
                *self.last_error.write() = None;
            }
            PreviewEvent::SyncFailed { message } => {
                *self.last_error.write() = Some(message.clone());
            }
            PreviewEvent::SessionEnded => {
                *self.status.write() = PreviewStatus::Ended;
            }
        }

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode preview event");
                return;
            }
        };

        let clients = self.clients.read().clone();
        let mut failed_ids = Vec::new();
        for (id, tx) in clients {
            if tx.try_send(json.clone()).is_err() {
                failed_ids.push(id);
            }
        }

        if !failed_ids.is_empty() {
            let mut clients = self.clients.write();
            for id in failed_ids {
                clients.remove(&id);
            }
        }
    }

    /// Register an SSE client and return its id and event receiver.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Drop every client sender so open event streams end.
    pub fn close_clients(&self) {
        self.clients.write().clear();
    }

    /// JSON body for `/__themekit/status`.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status(),
            "host": self.host,
            "previewUrl": self.preview_url(),
            "lastError": self.last_error.read().clone(),
            "reloads": self.reload_count(),
            "clients": self.client_count(),
        })
    }
}

/// Shared state handle for the router and the event reporter.
pub type SharedPreviewState = Arc<PreviewState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_sets_url_and_status() {
        let state = PreviewState::new("https://shop.example.com");
        assert_eq!(state.status(), PreviewStatus::Connecting);

        state.publish(&PreviewEvent::Connected {
            preview_url: "https://shop.example.com/preview".to_string(),
        });

        assert_eq!(state.status(), PreviewStatus::Live);
        assert_eq!(
            state.preview_url().as_deref(),
            Some("https://shop.example.com/preview")
        );
    }

    #[test]
    fn test_reload_clears_last_error() {
        let state = PreviewState::new("http://localhost:9292");
        state.publish(&PreviewEvent::SyncFailed {
            message: "sync timed out".to_string(),
        });
        assert_eq!(state.snapshot()["lastError"], "sync timed out");

        state.publish(&PreviewEvent::Reload {
            hint: "full".to_string(),
        });
        assert!(state.snapshot()["lastError"].is_null());
        assert_eq!(state.reload_count(), 1);
    }

    #[tokio::test]
    async fn test_clients_receive_events() {
        let state = PreviewState::new("http://localhost:9292");
        let (_id, mut rx) = state.register_client();

        state.publish(&PreviewEvent::Reload {
            hint: "style-only".to_string(),
        });

        let data = rx.recv().await.unwrap();
        assert_eq!(data, r#"{"type":"reload","hint":"style-only"}"#);
    }

    #[tokio::test]
    async fn test_client_registration() {
        let state = PreviewState::new("http://localhost:9292");

        let (id1, _rx1) = state.register_client();
        let (id2, _rx2) = state.register_client();
        assert_eq!(state.client_count(), 2);
        assert_ne!(id1, id2);

        state.unregister_client(id1);
        assert_eq!(state.client_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_receivers_are_pruned() {
        let state = PreviewState::new("http://localhost:9292");
        let (_id, rx) = state.register_client();
        drop(rx);

        state.publish(&PreviewEvent::SessionEnded);
        assert_eq!(state.client_count(), 0);
        assert_eq!(state.status(), PreviewStatus::Ended);
    }

    #[tokio::test]
    async fn test_close_clients_ends_streams() {
        let state = PreviewState::new("http://localhost:9292");
        let (_id, mut rx) = state.register_client();

        state.close_clients();
        assert!(rx.recv().await.is_none());
    }
}
