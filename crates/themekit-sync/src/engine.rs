//! The live sync orchestrator.
//!
//! `Idle -> Connecting -> InitialSync -> Validating -> Watching ->
//! ShuttingDown -> Terminated`, with `Error` reachable on fatal failures.
//! Everything that stops the engine goes through one [`Shutdown`] handle,
//! whether it came from a signal, the caller, or the watcher going away.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use themekit_config::{ConfigError, DevSyncConfig, ThemeRoot};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::classify::FileChange;
use crate::debounce::Debouncer;
use crate::error::EngineError;
use crate::filter::{WatchFilter, collect_files};
use crate::remote::{BatchOutcome, ConnectRequest, ThemeRemote, ValidationReport};
use crate::session::{Credentials, DevSession, SessionManager};
use crate::watcher::{ThemeWatcher, WatchEvent, WatchEventKind};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Connecting,
    InitialSync,
    Validating,
    Watching,
    ShuttingDown,
    Terminated,
    Error,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Connecting => "connecting",
            EngineState::InitialSync => "initial sync",
            EngineState::Validating => "validating",
            EngineState::Watching => "watching",
            EngineState::ShuttingDown => "shutting down",
            EngineState::Terminated => "terminated",
            EngineState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Progress reported to subscribers while the engine runs.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(EngineState),
    Connected {
        preview_url: String,
        expires_at: DateTime<Utc>,
    },
    InitialSync(BatchOutcome),
    Validated(ValidationReport),
    ValidationFailed {
        message: String,
    },
    Synced(BatchOutcome),
    Deleted(BatchOutcome),
    /// The request itself failed; nothing in `paths` reached the remote.
    SyncFailed {
        paths: Vec<String>,
        message: String,
    },
    FileSkipped {
        path: String,
        reason: String,
    },
    SessionExpired,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root: PathBuf,
    pub theme_name: Option<String>,
    pub debounce: Duration,
    pub stability: Duration,
    pub shutdown_grace: Duration,
    pub ignore: Vec<String>,
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_dev_config(root, &DevSyncConfig::default())
    }

    pub fn from_dev_config(root: impl Into<PathBuf>, config: &DevSyncConfig) -> Self {
        Self {
            root: root.into(),
            theme_name: config.theme_name.clone(),
            debounce: config.debounce(),
            stability: config.stability(),
            shutdown_grace: config.shutdown_grace(),
            ignore: config.ignore.clone(),
        }
    }
}

/// Cloneable stop signal. Triggering more than once has no further effect.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. Returns `true` only for the first call.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_synced: usize,
    pub files_failed: usize,
    pub files_deleted: usize,
    pub files_skipped: usize,
    /// Requests sent to the sync and delete endpoints
    pub pushes: usize,
}

impl RunSummary {
    fn absorb(&mut self, report: RunSummary) {
        self.files_synced += report.files_synced;
        self.files_failed += report.files_failed;
        self.files_deleted += report.files_deleted;
        self.files_skipped += report.files_skipped;
        self.pushes += report.pushes;
    }

    fn absorb_joined(&mut self, joined: Result<RunSummary, JoinError>) {
        match joined {
            Ok(report) => self.absorb(report),
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "push task failed"),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} synced, {} failed, {} deleted",
            self.files_synced, self.files_failed, self.files_deleted
        )
    }
}

pub struct SyncEngine {
    config: EngineConfig,
    remote: Arc<dyn ThemeRemote>,
    state: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, remote: Arc<dyn ThemeRemote>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            remote,
            state: Mutex::new(EngineState::Idle),
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Run until `shutdown` is triggered or a fatal error occurs.
    ///
    /// The session is disconnected exactly once on every path that
    /// connected, including errors after connect.
    ///
    /// # Errors
    ///
    /// Preflight (missing or unreadable theme root, unreadable manifest),
    /// a refused connect, failing to walk the theme on initial sync, or
    /// failing to start the watcher.
    pub async fn run(
        &self,
        credentials: Credentials,
        shutdown: Shutdown,
    ) -> Result<RunSummary, EngineError> {
        let (root, filter, theme_name) = match self.preflight() {
            Ok(checked) => checked,
            Err(e) => {
                self.set_state(EngineState::Error);
                return Err(e);
            }
        };

        if shutdown.is_triggered() {
            info!("stopped before the dev session was established");
            self.set_state(EngineState::Terminated);
            return Ok(RunSummary::default());
        }

        self.set_state(EngineState::Connecting);
        let request = ConnectRequest::new(theme_name, root.path().display().to_string());
        let mut sessions = SessionManager::new(Arc::clone(&self.remote));

        // `None` means shutdown won the race against connect.
        let connected = {
            let connect = async {
                sessions
                    .connect(&request, credentials)
                    .await
                    .map(DevSession::clone)
            };
            tokio::pin!(connect);

            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    // The server may already have opened a session; let the
                    // request finish so it can be closed again.
                    match tokio::time::timeout(self.config.shutdown_grace, &mut connect).await {
                        Ok(Ok(_)) => debug!("connected after shutdown was requested"),
                        Ok(Err(e)) => debug!(error = %e, "connect failed during shutdown"),
                        Err(_) => warn!("connect still pending after the shutdown grace period"),
                    }
                    None
                }
                result = &mut connect => Some(result),
            }
        };

        let session = match connected {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                self.set_state(EngineState::Error);
                return Err(e.into());
            }
            None => {
                if sessions.disconnect().await {
                    self.emit(EngineEvent::Disconnected);
                }
                info!("stopped before the dev session was established");
                self.set_state(EngineState::Terminated);
                return Ok(RunSummary::default());
            }
        };

        info!(theme = %request.theme_name, preview = %session.preview_url, "dev session started");
        self.emit(EngineEvent::Connected {
            preview_url: session.preview_url.clone(),
            expires_at: session.expires_at,
        });

        let pusher = Pusher {
            remote: Arc::clone(&self.remote),
            token: Arc::from(session.token.as_str()),
            root: root.path().to_path_buf(),
            expires_at: session.expires_at,
            expiry_reported: Arc::new(AtomicBool::new(false)),
            events: self.events.clone(),
        };

        let result = self.run_session(&root, &filter, &pusher, &shutdown).await;

        if result.is_err() {
            self.set_state(EngineState::ShuttingDown);
        }
        if sessions.disconnect().await {
            self.emit(EngineEvent::Disconnected);
        }

        match result {
            Ok(summary) => {
                info!(%summary, "dev session ended");
                self.set_state(EngineState::Terminated);
                Ok(summary)
            }
            Err(e) => {
                self.set_state(EngineState::Error);
                Err(e)
            }
        }
    }

    fn preflight(&self) -> Result<(ThemeRoot, WatchFilter, String), EngineError> {
        let root = ThemeRoot::open(&self.config.root)?;
        root.manifest()?;

        let filter =
            WatchFilter::new(&self.config.ignore).map_err(|e| ConfigError::InvalidValue {
                field: "ignore".to_string(),
                hint: Some(e.to_string()),
            })?;
        let theme_name = root.theme_name(self.config.theme_name.as_deref())?;

        Ok((root, filter, theme_name))
    }

    async fn run_session(
        &self,
        root: &ThemeRoot,
        filter: &WatchFilter,
        pusher: &Pusher,
        shutdown: &Shutdown,
    ) -> Result<RunSummary, EngineError> {
        let mut summary = RunSummary::default();

        self.set_state(EngineState::InitialSync);
        let files = collect_files(root.path(), filter)?;
        info!(files = files.len(), "starting initial sync");
        if let Some(report) = self.within_grace(pusher.initial_sync(files), shutdown).await {
            summary.absorb(report);
        }

        if !shutdown.is_triggered() {
            self.set_state(EngineState::Validating);
            self.within_grace(pusher.validate(), shutdown).await;
        }

        if shutdown.is_triggered() {
            self.set_state(EngineState::ShuttingDown);
        } else {
            self.watch(root.path(), filter, pusher, shutdown, &mut summary)
                .await?;
        }

        Ok(summary)
    }

    /// Steady state: settled watch events are debounced per path and
    /// flushed as pushes that run beside the loop.
    async fn watch(
        &self,
        root: &Path,
        filter: &WatchFilter,
        pusher: &Pusher,
        shutdown: &Shutdown,
        summary: &mut RunSummary,
    ) -> Result<(), EngineError> {
        let (watcher, mut watch_rx) =
            ThemeWatcher::start(root, filter.clone(), self.config.stability)?;
        self.set_state(EngineState::Watching);
        info!(root = %root.display(), "watching for changes");

        let debouncer = Debouncer::new(self.config.debounce);
        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<String>();
        let mut last_kind: HashMap<String, WatchEventKind> = HashMap::new();
        let mut pushes: JoinSet<RunSummary> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                event = watch_rx.recv() => {
                    let Some(event) = event else {
                        warn!("file watcher stopped");
                        break;
                    };
                    schedule(&debouncer, &flush_tx, &mut last_kind, event);
                }
                Some(path) = flush_rx.recv() => {
                    // Paths flushed in the same tick travel together.
                    let mut paths = vec![path];
                    while let Ok(path) = flush_rx.try_recv() {
                        paths.push(path);
                    }
                    let batch = take_kinds(&mut last_kind, paths);
                    pushes.spawn(pusher.clone().flush(batch));
                }
                Some(joined) = pushes.join_next(), if !pushes.is_empty() => {
                    summary.absorb_joined(joined);
                }
            }
        }

        self.set_state(EngineState::ShuttingDown);
        watcher.stop();
        drop(watcher);

        let mut pending = debouncer.drain();
        while let Ok(path) = flush_rx.try_recv() {
            pending.push(path);
        }
        pending.sort();
        pending.dedup();
        if !pending.is_empty() {
            info!(files = pending.len(), "flushing pending changes");
            let batch = take_kinds(&mut last_kind, pending);
            pushes.spawn(pusher.clone().flush(batch));
        }

        self.drain_pushes(&mut pushes, summary).await;
        Ok(())
    }

    /// Wait for in-flight pushes, but never longer than the grace period.
    async fn drain_pushes(&self, pushes: &mut JoinSet<RunSummary>, summary: &mut RunSummary) {
        let grace = tokio::time::sleep(self.config.shutdown_grace);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                joined = pushes.join_next() => match joined {
                    Some(joined) => summary.absorb_joined(joined),
                    None => break,
                },
                _ = &mut grace => {
                    warn!(
                        remaining = pushes.len(),
                        "in-flight pushes did not finish before the grace period ended"
                    );
                    pushes.abort_all();
                    break;
                }
            }
        }
    }

    /// Drive `fut` to completion. After shutdown is requested it only gets
    /// the grace period to finish.
    async fn within_grace<F: Future>(&self, fut: F, shutdown: &Shutdown) -> Option<F::Output> {
        tokio::pin!(fut);
        tokio::select! {
            out = &mut fut => Some(out),
            _ = shutdown.wait() => {
                tokio::time::timeout(self.config.shutdown_grace, fut).await.ok()
            }
        }
    }

    fn set_state(&self, state: EngineState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "engine state");
            self.emit(EngineEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn schedule(
    debouncer: &Debouncer,
    flush_tx: &mpsc::UnboundedSender<String>,
    last_kind: &mut HashMap<String, WatchEventKind>,
    event: WatchEvent,
) {
    debug!(path = %event.path, kind = ?event.kind, "change observed");
    last_kind.insert(event.path.clone(), event.kind);

    let tx = flush_tx.clone();
    let path = event.path.clone();
    debouncer.register(event.path, move || {
        let _ = tx.send(path);
    });
}

fn take_kinds(
    last_kind: &mut HashMap<String, WatchEventKind>,
    paths: Vec<String>,
) -> Vec<(String, Option<WatchEventKind>)> {
    paths
        .into_iter()
        .map(|path| {
            let kind = last_kind.remove(&path);
            (path, kind)
        })
        .collect()
}

/// Everything a push task needs, cheap to clone into spawned tasks.
#[derive(Clone)]
struct Pusher {
    remote: Arc<dyn ThemeRemote>,
    token: Arc<str>,
    root: PathBuf,
    expires_at: DateTime<Utc>,
    expiry_reported: Arc<AtomicBool>,
    events: broadcast::Sender<EngineEvent>,
}

impl Pusher {
    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    async fn initial_sync(&self, files: Vec<String>) -> RunSummary {
        let mut report = RunSummary::default();
        let mut changes = Vec::with_capacity(files.len());

        for path in files {
            match tokio::fs::read(self.root.join(&path)).await {
                Ok(bytes) => changes.push(FileChange::from_bytes(path, &bytes)),
                Err(e) => self.skip(path, &e, &mut report),
            }
        }

        if changes.is_empty() {
            info!("theme directory has no files to sync");
            return report;
        }

        if let Some(outcome) = self.push_files(changes, &mut report).await {
            self.emit(EngineEvent::InitialSync(outcome));
        }
        report
    }

    async fn validate(&self) {
        match self.remote.validate(&self.token).await {
            Ok(report) => {
                if report.is_valid {
                    info!(warnings = report.warning_count, "theme is valid");
                } else {
                    warn!(
                        errors = report.error_count,
                        warnings = report.warning_count,
                        "theme has validation errors"
                    );
                }
                for error in &report.errors {
                    warn!("{}", error);
                }
                for warning in &report.warnings {
                    info!("{}", warning);
                }
                self.emit(EngineEvent::Validated(report));
            }
            Err(e) => {
                warn!(error = %e, "validation request failed");
                self.emit(EngineEvent::ValidationFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Push the current on-disk state of each flushed path.
    ///
    /// Files that still exist are synced (latest content wins). Files that
    /// are gone after a removal are deleted remotely. Anything else that
    /// cannot be read is skipped for this flush.
    async fn flush(self, batch: Vec<(String, Option<WatchEventKind>)>) -> RunSummary {
        let mut report = RunSummary::default();
        let mut changes = Vec::new();
        let mut removed = Vec::new();

        for (path, kind) in batch {
            match tokio::fs::read(self.root.join(&path)).await {
                Ok(bytes) => changes.push(FileChange::from_bytes(path, &bytes)),
                Err(e)
                    if e.kind() == io::ErrorKind::NotFound
                        && kind == Some(WatchEventKind::Removed) =>
                {
                    removed.push(path);
                }
                Err(e) => self.skip(path, &e, &mut report),
            }
        }

        if !changes.is_empty() {
            if let Some(outcome) = self.push_files(changes, &mut report).await {
                self.emit(EngineEvent::Synced(outcome));
            }
        }
        if !removed.is_empty() {
            self.push_deletes(removed, &mut report).await;
        }

        report
    }

    async fn push_files(
        &self,
        changes: Vec<FileChange>,
        report: &mut RunSummary,
    ) -> Option<BatchOutcome> {
        self.check_expiry();
        let paths: Vec<String> = changes.iter().map(|c| c.path.clone()).collect();
        report.pushes += 1;

        match self.remote.sync(&self.token, &changes).await {
            Ok(result) => {
                let outcome = BatchOutcome::from_result(&paths, &result);
                report.files_synced += outcome.succeeded();
                report.files_failed += outcome.failed();

                if outcome.is_complete() {
                    info!(
                        files = paths.len(),
                        reload = outcome.reload_hint.as_str(),
                        "synced {}",
                        summarize_paths(&paths)
                    );
                } else {
                    warn!("sync partially rejected: {}", outcome);
                    for error in &outcome.errors {
                        warn!("{}", error);
                    }
                }
                Some(outcome)
            }
            Err(e) => {
                report.files_failed += paths.len();
                warn!(error = %e, "failed to sync {}", summarize_paths(&paths));
                self.emit(EngineEvent::SyncFailed {
                    paths,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    async fn push_deletes(&self, paths: Vec<String>, report: &mut RunSummary) {
        self.check_expiry();
        report.pushes += 1;

        match self.remote.delete(&self.token, &paths).await {
            Ok(result) => {
                let outcome = BatchOutcome::from_result(&paths, &result);
                report.files_deleted += outcome.succeeded();
                report.files_failed += outcome.failed();

                if outcome.is_complete() {
                    info!("deleted {}", summarize_paths(&paths));
                } else {
                    warn!("delete partially rejected: {}", outcome);
                    for error in &outcome.errors {
                        warn!("{}", error);
                    }
                }
                self.emit(EngineEvent::Deleted(outcome));
            }
            Err(e) => {
                report.files_failed += paths.len();
                warn!(error = %e, "failed to delete {}", summarize_paths(&paths));
                self.emit(EngineEvent::SyncFailed {
                    paths,
                    message: e.to_string(),
                });
            }
        }
    }

    fn skip(&self, path: String, error: &io::Error, report: &mut RunSummary) {
        warn!(path = %path, error = %error, "skipping unreadable file");
        report.files_skipped += 1;
        self.emit(EngineEvent::FileSkipped {
            path,
            reason: error.to_string(),
        });
    }

    fn check_expiry(&self) {
        if Utc::now() >= self.expires_at && !self.expiry_reported.swap(true, Ordering::SeqCst) {
            warn!(expired_at = %self.expires_at, "dev session has expired; restart to reconnect");
            self.emit(EngineEvent::SessionExpired);
        }
    }
}

fn summarize_paths(paths: &[String]) -> String {
    match paths {
        [single] => single.clone(),
        _ => format!("{} files", paths.len()),
    }
}
