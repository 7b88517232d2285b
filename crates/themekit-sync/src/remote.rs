//! Request/response transport to the remote storefront.
//!
//! [`ThemeRemote`] is the seam the engine talks through; [`HttpRemote`] is
//! the production implementation. Every method is a single call with no
//! retries. A request that fails (non-2xx, timeout, unreachable host) is a
//! [`RemoteError`]; a request the server processed but partly rejected
//! comes back as a normal [`SyncResult`] with `success == false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::classify::FileChange;
use crate::error::RemoteError;
use crate::session::Credentials;

/// Header carrying the session token on every call after connect.
pub const SESSION_HEADER: &str = "X-Theme-Session";

pub const CONNECT_ROUTE: &str = "/api/dev/connect";
pub const SYNC_ROUTE: &str = "/api/dev/sync";
pub const DELETE_ROUTE: &str = "/api/dev/delete";
pub const VALIDATE_ROUTE: &str = "/api/dev/validate";
pub const DISCONNECT_ROUTE: &str = "/api/dev/disconnect";

/// Stylesheet extensions that can be swapped in place without a reload.
const STYLE_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "themekit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub theme_name: String,
    pub theme_path: String,
    pub client_info: ClientInfo,
}

impl ConnectRequest {
    pub fn new(theme_name: impl Into<String>, theme_path: impl Into<String>) -> Self {
        Self {
            theme_name: theme_name.into(),
            theme_path: theme_path.into(),
            client_info: ClientInfo::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Path relative to the host where the live preview is rendered
    #[serde(rename = "previewURL")]
    pub preview_url: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct SyncRequest<'a> {
    files: &'a [FileChange],
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    paths: &'a [String],
}

/// What the preview needs to do after a batch lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReloadHint {
    #[serde(rename = "style-only")]
    StyleOnly,
    #[serde(rename = "full")]
    Full,
}

impl ReloadHint {
    /// Hint for a batch: style-only when every path is a stylesheet.
    pub fn for_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut any = false;
        for path in paths {
            any = true;
            if !is_stylesheet(path.as_ref()) {
                return ReloadHint::Full;
            }
        }
        if any {
            ReloadHint::StyleOnly
        } else {
            ReloadHint::Full
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadHint::StyleOnly => "style-only",
            ReloadHint::Full => "full",
        }
    }
}

fn is_stylesheet(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| STYLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    #[serde(default)]
    pub synced: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_hint: Option<ReloadHint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub error_count: usize,
    #[serde(default)]
    pub warning_count: usize,
}

/// Local interpretation of a [`SyncResult`] for a known set of paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub requested: Vec<String>,
    pub synced: Vec<String>,
    pub errors: Vec<String>,
    pub reload_hint: ReloadHint,
}

impl BatchOutcome {
    pub fn from_result(requested: &[String], result: &SyncResult) -> Self {
        Self {
            requested: requested.to_vec(),
            synced: result.synced.clone(),
            errors: result.errors.clone(),
            reload_hint: result
                .reload_hint
                .unwrap_or_else(|| ReloadHint::for_paths(requested)),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.synced.len().min(self.requested.len())
    }

    pub fn failed(&self) -> usize {
        self.requested.len() - self.succeeded()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0 && self.errors.is_empty()
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded(), self.failed())
    }
}

/// Calls the engine makes against the remote host.
#[async_trait]
pub trait ThemeRemote: Send + Sync {
    /// Open a dev session. Credentials are consumed by the call.
    async fn connect(
        &self,
        request: &ConnectRequest,
        credentials: Credentials,
    ) -> Result<ConnectResponse, RemoteError>;

    async fn sync(&self, token: &str, files: &[FileChange]) -> Result<SyncResult, RemoteError>;

    async fn delete(&self, token: &str, paths: &[String]) -> Result<SyncResult, RemoteError>;

    async fn validate(&self, token: &str) -> Result<ValidationReport, RemoteError>;

    async fn disconnect(&self, token: &str) -> Result<(), RemoteError>;
}

/// [`ThemeRemote`] over HTTP(S) with a bounded per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// # Errors
    ///
    /// Fails when `host` is not an absolute http(s) URL.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = host.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|_| RemoteError::InvalidHost(host.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidHost(host.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("themekit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Network {
                endpoint: "client",
                message: e.to_string(),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    async fn execute(
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "remote responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            endpoint,
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }

    async fn execute_json<T: DeserializeOwned>(
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        Self::execute(endpoint, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout { endpoint }
                } else {
                    RemoteError::Decode {
                        endpoint,
                        message: e.to_string(),
                    }
                }
            })
    }
}

#[async_trait]
impl ThemeRemote for HttpRemote {
    async fn connect(
        &self,
        request: &ConnectRequest,
        credentials: Credentials,
    ) -> Result<ConnectResponse, RemoteError> {
        let (username, password) = credentials.into_parts();
        let builder = self
            .client
            .post(self.url(CONNECT_ROUTE))
            .basic_auth(username, Some(password))
            .json(request);
        Self::execute_json("connect", builder).await
    }

    async fn sync(&self, token: &str, files: &[FileChange]) -> Result<SyncResult, RemoteError> {
        let builder = self
            .client
            .post(self.url(SYNC_ROUTE))
            .header(SESSION_HEADER, token)
            .json(&SyncRequest { files });
        Self::execute_json("sync", builder).await
    }

    async fn delete(&self, token: &str, paths: &[String]) -> Result<SyncResult, RemoteError> {
        let builder = self
            .client
            .post(self.url(DELETE_ROUTE))
            .header(SESSION_HEADER, token)
            .json(&DeleteRequest { paths });
        Self::execute_json("delete", builder).await
    }

    async fn validate(&self, token: &str) -> Result<ValidationReport, RemoteError> {
        let builder = self
            .client
            .get(self.url(VALIDATE_ROUTE))
            .header(SESSION_HEADER, token);
        Self::execute_json("validate", builder).await
    }

    async fn disconnect(&self, token: &str) -> Result<(), RemoteError> {
        let builder = self
            .client
            .post(self.url(DISCONNECT_ROUTE))
            .header(SESSION_HEADER, token);
        Self::execute("disconnect", builder).await.map(|_| ())
    }
}

fn transport_error(endpoint: &'static str, error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout { endpoint }
    } else {
        RemoteError::Network {
            endpoint,
            message: error.to_string(),
        }
    }
}

/// Remote-provided `message` or `error` field, else the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        })
}
