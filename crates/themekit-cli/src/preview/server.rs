//! Preview server with live reload via Server-Sent Events.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Sse, sse::Event, sse::KeepAlive},
    routing::get,
};
use std::convert::Infallible;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::cors::{Any, CorsLayer};

use super::SharedPreviewState;
use crate::error::{CliError, Result};

const SHELL_TEMPLATE: &str = include_str!("../../assets/preview/shell.html");
const RELOAD_SCRIPT: &str = include_str!("../../assets/preview/reload-client.js");

pub const EVENTS_PATH: &str = "/__themekit/events";
pub const RELOAD_SCRIPT_PATH: &str = "/__themekit/reload.js";
pub const STATUS_PATH: &str = "/__themekit/status";

/// A bound preview server, ready to serve.
pub struct PreviewServer {
    listener: TcpListener,
    state: SharedPreviewState,
}

impl PreviewServer {
    /// Bind to `127.0.0.1:port`. Port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Server` when the port is taken or not permitted.
    pub async fn bind(port: u16, state: SharedPreviewState) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CliError::Server(format!("Failed to bind to {}: {}", addr, e)))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn url(&self) -> Result<String> {
        Ok(format!("http://{}", self.local_addr()?))
    }

    /// Serve until `stop` resolves, then finish in-flight requests.
    ///
    /// Open event streams hold graceful shutdown open; call
    /// [`super::PreviewState::close_clients`] first.
    pub async fn serve(self, stop: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = router(self.state);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(stop)
            .await
            .map_err(|e| CliError::Server(format!("Server error: {}", e)))
    }
}

/// Build the router. Exposed for tests that drive it without a socket.
pub fn router(state: SharedPreviewState) -> Router {
    Router::new()
        .route("/", get(handle_shell))
        .route(RELOAD_SCRIPT_PATH, get(handle_reload_script))
        .route(EVENTS_PATH, get(handle_events))
        .route(STATUS_PATH, get(handle_status))
        .route("/favicon.ico", get(handle_favicon))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_shell(State(state): State<SharedPreviewState>) -> impl IntoResponse {
    let preview_url = state
        .preview_url()
        .unwrap_or_else(|| "about:blank".to_string());
    let html = render_shell(state.host(), &preview_url);
    ([(header::CACHE_CONTROL, "no-cache")], Html(html))
}

async fn handle_reload_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        RELOAD_SCRIPT,
    )
}

async fn handle_events(
    State(state): State<SharedPreviewState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (id, rx) = state.register_client();
    tracing::debug!(client = id, "preview client connected");

    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_status(State(state): State<SharedPreviewState>) -> impl IntoResponse {
    Json(state.snapshot())
}

async fn handle_favicon() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

fn render_shell(host: &str, preview_url: &str) -> String {
    SHELL_TEMPLATE
        .replace("{{HOST}}", &escape_html(host))
        .replace("{{PREVIEW_URL}}", &escape_html(preview_url))
        .replace("{{RELOAD_SCRIPT}}", RELOAD_SCRIPT_PATH)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
