//! Dev session lifecycle.
//!
//! `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`.
//! A [`SessionManager`] holds at most one [`DevSession`] and calls the
//! remote disconnect at most once per successful connect.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, SessionError};
use crate::remote::{ConnectRequest, ConnectResponse, ThemeRemote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// An authenticated, time-bounded connection to the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub preview_url: String,
}

impl DevSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl From<ConnectResponse> for DevSession {
    fn from(response: ConnectResponse) -> Self {
        Self {
            token: response.token,
            expires_at: response.expires_at,
            preview_url: response.preview_url,
        }
    }
}

/// Username and password for the connect call. Never printed.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn into_parts(self) -> (String, String) {
        (self.username, self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct SessionManager {
    remote: Arc<dyn ThemeRemote>,
    state: SessionState,
    session: Option<DevSession>,
}

impl SessionManager {
    pub fn new(remote: Arc<dyn ThemeRemote>) -> Self {
        Self {
            remote,
            state: SessionState::Disconnected,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&DevSession> {
        self.session.as_ref()
    }

    /// Open the session with a single request. Never retried.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` when a session is held; `Connection` when the
    /// remote refused or could not be reached.
    pub async fn connect(
        &mut self,
        request: &ConnectRequest,
        credentials: Credentials,
    ) -> Result<&DevSession, SessionError> {
        if self.state != SessionState::Disconnected || self.session.is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        self.state = SessionState::Connecting;
        debug!(theme = %request.theme_name, user = credentials.username(), "connecting");

        match self.remote.connect(request, credentials).await {
            Ok(response) => {
                if let Some(message) = response.message.as_deref() {
                    info!("{}", message);
                }
                self.state = SessionState::Connected;
                let session = self.session.insert(DevSession::from(response));
                Ok(&*session)
            }
            Err(err) => {
                self.state = SessionState::Disconnected;
                Err(SessionError::Connection(connect_failure_message(&err)))
            }
        }
    }

    /// Best-effort teardown. Failures are logged, never returned.
    ///
    /// Returns whether the remote was called. Calling again after a
    /// disconnect, or without a session, does nothing.
    pub async fn disconnect(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        self.state = SessionState::Disconnecting;
        match self.remote.disconnect(&session.token).await {
            Ok(()) => debug!("dev session closed"),
            Err(e) => warn!(error = %e, "failed to close dev session"),
        }
        self.state = SessionState::Disconnected;
        true
    }
}

fn connect_failure_message(err: &RemoteError) -> String {
    match err {
        RemoteError::Status {
            status, message, ..
        } => format!("{} (HTTP {})", message, status),
        other => other.to_string(),
    }
}
