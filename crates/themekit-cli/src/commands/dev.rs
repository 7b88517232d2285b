//! `themekit dev` implementation.
//!
//! Orchestrates a live dev session:
//! - Resolve the theme root, configuration and credentials
//! - Start the optional local preview server
//! - Run the sync engine until Ctrl+C or SIGTERM
//! - Report engine progress as terminal status lines and preview events

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use reqwest::Url;
use themekit_config::{ConfigDiscovery, DevSyncOverrides, ThemeRoot};
use themekit_sync::{
    BatchOutcome, EngineConfig, EngineEvent, EngineState, HttpRemote, Shutdown, SyncEngine,
    ValidationReport,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cli::DevArgs;
use crate::credentials;
use crate::error::{CliError, Result};
use crate::preview::{PreviewEvent, PreviewServer, PreviewState, SharedPreviewState};
use crate::ui;

/// How long the preview server may take to finish after the session ends.
const PREVIEW_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Execute the dev command.
///
/// # Process Flow
///
/// 1. Open the theme directory and load configuration
/// 2. Resolve credentials (environment or prompt)
/// 3. Start the preview server when a port is configured
/// 4. Run the engine; signals trigger its shutdown handle
/// 5. Stop the preview server and print the session summary
///
/// # Errors
///
/// Fails on invalid configuration, missing credentials, a preview port that
/// cannot be bound, or a session the remote refuses. Per-file sync failures
/// are reported and do not end the session.
pub async fn execute(args: DevArgs) -> Result<()> {
    let started = Instant::now();

    let root = ThemeRoot::open(&args.theme_dir)?;
    let overrides = DevSyncOverrides {
        host: args.host.clone(),
        theme_name: args.theme_name.clone(),
        preview_port: args.port,
        open: (!args.open).then_some(false),
    };
    let config = ConfigDiscovery::new(root.path()).load(args.config.as_deref(), &overrides)?;
    config.validate()?;
    let host = config.require_host()?;

    debug!(root = %root.path().display(), host = %host, "dev configuration loaded");

    let credentials = tokio::task::spawn_blocking(credentials::resolve)
        .await
        .map_err(|e| CliError::Custom(format!("credential prompt failed: {}", e)))??;

    let remote = HttpRemote::new(&host, config.request_timeout())?;
    let engine = SyncEngine::new(
        EngineConfig::from_dev_config(root.path(), &config),
        Arc::new(remote),
    );

    let shutdown = Shutdown::new();
    let signals = tokio::spawn(forward_signals(shutdown.clone()));

    let preview = match config.preview_port {
        Some(port) => Some(start_preview(port, &host).await?),
        None => None,
    };

    let reporter = tokio::spawn(report_events(
        engine.subscribe(),
        Reporter {
            host: host.clone(),
            root: root.path().to_path_buf(),
            preview_state: preview.as_ref().map(|p| Arc::clone(&p.state)),
            local_url: preview.as_ref().map(|p| p.url.clone()),
            open: config.open,
        },
    ));

    let result = engine.run(credentials, shutdown).await;

    // Dropping the engine closes its event channel and ends the reporter.
    drop(engine);
    if let Err(e) = reporter.await {
        warn!(error = %e, "event reporter failed");
    }
    signals.abort();

    if let Some(preview) = preview {
        preview.stop().await;
    }

    let summary = result?;
    ui::print_session_summary(&summary, started.elapsed());
    Ok(())
}

struct RunningPreview {
    state: SharedPreviewState,
    url: String,
    stop: Shutdown,
    handle: JoinHandle<Result<()>>,
}

impl RunningPreview {
    async fn stop(self) {
        self.state.close_clients();
        self.stop.trigger();

        let mut handle = self.handle;
        match tokio::time::timeout(PREVIEW_STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => ui::warning(&e.to_string()),
            Ok(Err(e)) => warn!(error = %e, "preview server task failed"),
            Err(_) => {
                debug!("preview server did not stop in time");
                handle.abort();
            }
        }
    }
}

async fn start_preview(port: u16, host: &str) -> Result<RunningPreview> {
    let state = Arc::new(PreviewState::new(host));
    let server = PreviewServer::bind(port, Arc::clone(&state)).await?;
    let url = server.url()?;

    let stop = Shutdown::new();
    let server_stop = stop.clone();
    let handle = tokio::spawn(server.serve(async move { server_stop.wait().await }));

    ui::info(&format!("Preview server running at {}", url));
    Ok(RunningPreview {
        state,
        url,
        stop,
        handle,
    })
}

/// Trigger `shutdown` on every Ctrl+C or SIGTERM until aborted.
async fn forward_signals(shutdown: Shutdown) {
    #[cfg(unix)]
    let mut terminate =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                None
            }
        };

    loop {
        #[cfg(unix)]
        let received = tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = recv_terminate(&mut terminate) => Ok(()),
        };
        #[cfg(not(unix))]
        let received = tokio::signal::ctrl_c().await;

        if let Err(e) = received {
            warn!(error = %e, "cannot listen for Ctrl+C");
            return;
        }

        if shutdown.trigger() {
            ui::info("Shutting down, flushing pending changes...");
        } else {
            ui::info("Already shutting down");
        }
    }
}

#[cfg(unix)]
async fn recv_terminate(stream: &mut Option<tokio::signal::unix::Signal>) {
    match stream {
        Some(stream) => {
            if stream.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

struct Reporter {
    host: String,
    root: PathBuf,
    preview_state: Option<SharedPreviewState>,
    local_url: Option<String>,
    open: bool,
}

/// Turn engine events into status lines until the engine is dropped.
async fn report_events(mut events: broadcast::Receiver<EngineEvent>, reporter: Reporter) {
    let mut spinner = Some(ui::Spinner::new(&format!("Connecting to {}", reporter.host)));
    let mut absolute_preview = String::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event reporter fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if let EngineEvent::Connected { preview_url, .. } = &event {
            absolute_preview = resolve_preview_url(&reporter.host, preview_url);
        }

        if let Some(state) = &reporter.preview_state {
            if let Some(preview_event) = PreviewEvent::from_engine(&event, &absolute_preview) {
                state.publish(&preview_event);
            }
        }

        match event {
            EngineEvent::StateChanged(EngineState::InitialSync) => {
                if let Some(spinner) = &spinner {
                    spinner.set_message("Uploading theme files");
                }
            }
            EngineEvent::StateChanged(EngineState::Watching) => {
                ui::info(&format!(
                    "Watching {} for changes. Press Ctrl+C to stop",
                    reporter.root.display()
                ));
            }
            EngineEvent::StateChanged(EngineState::Error) => {
                if let Some(spinner) = spinner.take() {
                    spinner.fail("Dev session could not start");
                }
            }
            EngineEvent::StateChanged(state) => debug!(%state, "engine state changed"),
            EngineEvent::Connected { expires_at, .. } => {
                let expires = expires_at.with_timezone(&Local).format("%H:%M");
                if let Some(spinner) = &spinner {
                    spinner.set_message(&format!("Connected (session expires at {})", expires));
                }
                ui::info(&format!("Preview: {}", absolute_preview));

                if reporter.open {
                    let target = reporter.local_url.as_deref().unwrap_or(&absolute_preview);
                    open_browser(target);
                }
            }
            EngineEvent::InitialSync(outcome) => {
                let message = format!("Initial sync: {}", outcome);
                match spinner.take() {
                    Some(spinner) if outcome.is_complete() => spinner.finish(&message),
                    Some(spinner) => spinner.fail(&message),
                    None => ui::info(&message),
                }
                report_batch_errors(&outcome);
            }
            EngineEvent::Validated(report) => report_validation(&report),
            EngineEvent::ValidationFailed { message } => {
                ui::warning(&format!("Could not validate theme: {}", message));
            }
            EngineEvent::Synced(outcome) => {
                if outcome.succeeded() > 0 {
                    ui::success(&format!("Synced {}", describe(&outcome.synced)));
                }
                report_batch_errors(&outcome);
            }
            EngineEvent::Deleted(outcome) => {
                if outcome.succeeded() > 0 {
                    ui::success(&format!("Deleted {}", describe(&outcome.synced)));
                }
                report_batch_errors(&outcome);
            }
            EngineEvent::SyncFailed { paths, message } => {
                ui::error(&format!("Failed to sync {}: {}", describe(&paths), message));
            }
            EngineEvent::FileSkipped { path, reason } => {
                ui::warning(&format!("Skipped {}: {}", path, reason));
            }
            EngineEvent::SessionExpired => {
                ui::warning("Dev session has expired; restart `themekit dev` if pushes fail");
            }
            EngineEvent::Disconnected => {
                ui::info(&format!("Disconnected from {}", reporter.host));
            }
        }
    }

    if let Some(spinner) = spinner {
        spinner.clear();
    }
}

fn report_batch_errors(outcome: &BatchOutcome) {
    for error in &outcome.errors {
        ui::warning(error);
    }
}

fn report_validation(report: &ValidationReport) {
    if report.is_valid {
        if report.warning_count == 0 {
            ui::success("Theme is valid");
        } else {
            ui::success(&format!(
                "Theme is valid ({})",
                ui::format_count(report.warning_count, "warning")
            ));
        }
    } else {
        ui::warning(&format!(
            "Theme has {}",
            ui::format_count(report.error_count.max(report.errors.len()), "error")
        ));
    }

    for error in &report.errors {
        ui::error(error);
    }
    for warning in &report.warnings {
        ui::warning(warning);
    }
}

fn describe(paths: &[String]) -> String {
    match paths {
        [single] => single.clone(),
        _ => ui::format_count(paths.len(), "file"),
    }
}

/// Absolute preview URL. Relative URLs from the remote are resolved against
/// the host, which is treated as a directory.
fn resolve_preview_url(host: &str, preview_url: &str) -> String {
    let base = format!("{}/", host.trim_end_matches('/'));
    match Url::parse(&base).and_then(|base| base.join(preview_url)) {
        Ok(url) => url.to_string(),
        Err(e) => {
            debug!(host, preview_url, error = %e, "cannot resolve preview URL");
            preview_url.to_string()
        }
    }
}

/// Open `url` in the default browser.
///
/// Uses platform-specific commands:
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
fn open_browser(url: &str) {
    use std::process::{Command, Stdio};

    if url.is_empty() {
        return;
    }

    let mut command = if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    match command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(_) => ui::info(&format!("Opened browser at {}", url)),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}
