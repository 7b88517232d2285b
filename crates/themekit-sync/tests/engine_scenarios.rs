//! End-to-end engine runs against a recording remote and a real theme
//! directory on disk.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use themekit_config::ConfigError;
use themekit_sync::{
    ConnectRequest, ConnectResponse, Credentials, Encoding, EngineConfig, EngineError,
    EngineEvent, EngineState, FileChange, RemoteError, RunSummary, SessionError, Shutdown,
    SyncEngine, SyncResult, ThemeRemote, ValidationReport,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

#[derive(Debug, Clone)]
enum Call {
    Connect,
    Sync(Vec<FileChange>),
    Delete(Vec<String>),
    Validate,
    Disconnect,
}

#[derive(Default)]
struct RecordingRemote {
    calls: Mutex<Vec<Call>>,
    refuse_connect: bool,
    /// In-band rejections by path
    reject: Vec<String>,
    /// Number of upcoming sync calls that time out
    failing_syncs: AtomicUsize,
    /// Hand out a session that has already expired
    expired_session: bool,
    /// How long the server takes to answer connect
    connect_delay: Option<Duration>,
}

impl RecordingRemote {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn syncs(&self) -> Vec<Vec<FileChange>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Sync(files) => Some(files),
                _ => None,
            })
            .collect()
    }

    fn deletes(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(paths) => Some(paths),
                _ => None,
            })
            .collect()
    }

    fn disconnects(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Disconnect))
            .count()
    }
}

#[async_trait]
impl ThemeRemote for RecordingRemote {
    async fn connect(
        &self,
        _request: &ConnectRequest,
        _credentials: Credentials,
    ) -> Result<ConnectResponse, RemoteError> {
        self.calls.lock().push(Call::Connect);
        if let Some(delay) = self.connect_delay {
            sleep(delay).await;
        }
        if self.refuse_connect {
            return Err(RemoteError::Status {
                endpoint: "connect",
                status: 401,
                message: "Invalid credentials".to_string(),
            });
        }
        let expires_at = if self.expired_session {
            Utc::now() - ChronoDuration::minutes(1)
        } else {
            Utc::now() + ChronoDuration::hours(2)
        };
        Ok(ConnectResponse {
            token: "tok".to_string(),
            expires_at,
            preview_url: "/preview/dawn".to_string(),
            message: None,
        })
    }

    async fn sync(&self, _token: &str, files: &[FileChange]) -> Result<SyncResult, RemoteError> {
        self.calls.lock().push(Call::Sync(files.to_vec()));

        let failing = self
            .failing_syncs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RemoteError::Timeout { endpoint: "sync" });
        }

        let (rejected, synced): (Vec<_>, Vec<_>) = files
            .iter()
            .map(|f| f.path.clone())
            .partition(|path| self.reject.contains(path));
        Ok(SyncResult {
            success: rejected.is_empty(),
            synced,
            errors: rejected
                .iter()
                .map(|path| format!("{path}: rejected by validation"))
                .collect(),
            reload_hint: None,
        })
    }

    async fn delete(&self, _token: &str, paths: &[String]) -> Result<SyncResult, RemoteError> {
        self.calls.lock().push(Call::Delete(paths.to_vec()));
        Ok(SyncResult {
            success: true,
            synced: paths.to_vec(),
            errors: Vec::new(),
            reload_hint: None,
        })
    }

    async fn validate(&self, _token: &str) -> Result<ValidationReport, RemoteError> {
        self.calls.lock().push(Call::Validate);
        Ok(ValidationReport {
            is_valid: true,
            ..ValidationReport::default()
        })
    }

    async fn disconnect(&self, _token: &str) -> Result<(), RemoteError> {
        self.calls.lock().push(Call::Disconnect);
        Ok(())
    }
}

struct Running {
    engine: Arc<SyncEngine>,
    shutdown: Shutdown,
    events: broadcast::Receiver<EngineEvent>,
    handle: JoinHandle<Result<RunSummary, EngineError>>,
}

impl Running {
    async fn wait_for<F>(&mut self, mut matches: F) -> EngineEvent
    where
        F: FnMut(&EngineEvent) -> bool,
    {
        let events = &mut self.events;
        timeout(Duration::from_secs(10), async move {
            loop {
                match events.recv().await {
                    Ok(event) if matches(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("engine dropped"),
                }
            }
        })
        .await
        .expect("timed out waiting for engine event")
    }

    async fn watching(&mut self) {
        self.wait_for(|e| matches!(e, EngineEvent::StateChanged(EngineState::Watching)))
            .await;
    }

    async fn stop(self) -> Result<RunSummary, EngineError> {
        self.shutdown.trigger();
        timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("engine stops")
            .expect("engine task")
    }
}

fn config(root: &Path) -> EngineConfig {
    EngineConfig {
        shutdown_grace: Duration::from_secs(2),
        ..EngineConfig::new(root)
    }
}

fn start(config: EngineConfig, remote: Arc<RecordingRemote>) -> Running {
    let engine = Arc::new(SyncEngine::new(config, remote));
    let events = engine.subscribe();
    let shutdown = Shutdown::new();

    let handle = tokio::spawn({
        let engine = Arc::clone(&engine);
        let shutdown = shutdown.clone();
        async move { engine.run(Credentials::new("dev", "secret"), shutdown).await }
    });

    Running {
        engine,
        shutdown,
        events,
        handle,
    }
}

fn theme() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("manifest.json"), r#"{"name": "Dawn"}"#).unwrap();
    fs::write(root.join("tokens.json"), r##"{"color": {"primary": "#000"}}"##).unwrap();
    fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G', 0x0d, 0x0a]).unwrap();
    fs::create_dir(root.join(".git")).unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    dir
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(10), async {
        while !condition() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn initial_sync_pushes_whole_theme_then_validates() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote::default());
    let mut running = start(config(dir.path()), remote.clone());

    running.watching().await;

    let calls = remote.calls();
    assert!(matches!(calls[0], Call::Connect));
    let Call::Sync(files) = &calls[1] else {
        panic!("expected initial sync, got {:?}", calls[1]);
    };
    assert!(matches!(calls[2], Call::Validate));

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["logo.png", "manifest.json", "tokens.json"]);
    for file in files {
        let expected = if file.path == "logo.png" {
            Encoding::Base64
        } else {
            Encoding::Utf8
        };
        assert_eq!(file.encoding, expected, "{}", file.path);
    }
    let tokens = files.iter().find(|f| f.path == "tokens.json").unwrap();
    assert_eq!(tokens.content, r##"{"color": {"primary": "#000"}}"##);

    let summary = running.stop().await.unwrap();
    assert_eq!(summary.files_synced, 3);
    assert_eq!(summary.files_failed, 0);
    assert_eq!(remote.disconnects(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rapid_edits_push_once_with_latest_content() {
    let dir = theme();
    fs::create_dir(dir.path().join("sections")).unwrap();
    let header = dir.path().join("sections/header.liquid");
    fs::write(&header, "v0").unwrap();

    let remote = Arc::new(RecordingRemote::default());
    let mut running = start(config(dir.path()), remote.clone());
    running.watching().await;

    for version in 1..=5 {
        fs::write(&header, format!("v{version}")).unwrap();
        sleep(Duration::from_millis(10)).await;
    }

    eventually(|| remote.syncs().len() == 2).await;
    // Nothing else trickles in after the quiet window.
    sleep(Duration::from_millis(600)).await;

    let syncs = remote.syncs();
    assert_eq!(syncs.len(), 2, "initial sync plus one incremental push");
    assert_eq!(syncs[1].len(), 1);
    assert_eq!(syncs[1][0].path, "sections/header.liquid");
    assert_eq!(syncs[1][0].content, "v5");

    running.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_session_warns_once_and_keeps_syncing() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote {
        expired_session: true,
        ..RecordingRemote::default()
    });
    let mut running = start(config(dir.path()), remote.clone());

    running
        .wait_for(|e| matches!(e, EngineEvent::SessionExpired))
        .await;
    running.watching().await;

    fs::write(dir.path().join("tokens.json"), r#"{"color": {}}"#).unwrap();
    running
        .wait_for(|e| {
            assert!(
                !matches!(e, EngineEvent::SessionExpired),
                "expiry reported twice"
            );
            matches!(e, EngineEvent::Synced(_))
        })
        .await;

    let summary = running.stop().await.unwrap();
    assert_eq!(summary.files_synced, 4);
    assert_eq!(remote.syncs().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connect_never_watches_or_disconnects() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote {
        refuse_connect: true,
        ..RecordingRemote::default()
    });
    let mut running = start(config(dir.path()), remote.clone());

    let result = timeout(Duration::from_secs(10), &mut running.handle)
        .await
        .unwrap()
        .unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::Session(SessionError::Connection(_))));
    assert!(err.to_string().contains("Invalid credentials"));

    assert!(matches!(remote.calls().as_slice(), [Call::Connect]));
    assert_eq!(running.engine.state(), EngineState::Error);

    let mut saw_watching = false;
    while let Ok(event) = running.events.try_recv() {
        if event == EngineEvent::StateChanged(EngineState::Watching) {
            saw_watching = true;
        }
    }
    assert!(!saw_watching);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_mid_watch_does_not_stop_the_loop() {
    let dir = theme();
    let tokens = dir.path().join("tokens.json");
    let remote = Arc::new(RecordingRemote::default());
    let mut running = start(config(dir.path()), remote.clone());
    running.watching().await;

    remote.failing_syncs.store(1, Ordering::SeqCst);
    fs::write(&tokens, r#"{"color": "red"}"#).unwrap();

    let failed = running
        .wait_for(|e| matches!(e, EngineEvent::SyncFailed { .. }))
        .await;
    let EngineEvent::SyncFailed { paths, message } = failed else {
        unreachable!()
    };
    assert_eq!(paths, vec!["tokens.json"]);
    assert!(message.contains("timed out"));

    fs::write(&tokens, r#"{"color": "blue"}"#).unwrap();
    running
        .wait_for(|e| matches!(e, EngineEvent::Synced(_)))
        .await;

    let syncs = remote.syncs();
    assert_eq!(syncs.len(), 3);
    assert_eq!(syncs[2][0].content, r#"{"color": "blue"}"#);
    assert_eq!(running.engine.state(), EngineState::Watching);

    let summary = running.stop().await.unwrap();
    assert_eq!(summary.files_failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_shutdown_disconnects_once() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote::default());
    let mut running = start(config(dir.path()), remote.clone());
    running.watching().await;

    assert!(running.shutdown.trigger());
    assert!(!running.shutdown.clone().trigger());

    let engine = Arc::clone(&running.engine);
    let result = running.stop().await;
    assert!(result.is_ok());
    assert_eq!(remote.disconnects(), 1);
    assert_eq!(engine.state(), EngineState::Terminated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_initial_sync_is_reported_and_watching_continues() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote {
        reject: vec!["logo.png".to_string()],
        ..RecordingRemote::default()
    });
    let mut running = start(config(dir.path()), remote.clone());

    let event = running
        .wait_for(|e| matches!(e, EngineEvent::InitialSync(_)))
        .await;
    let EngineEvent::InitialSync(outcome) = event else {
        unreachable!()
    };
    assert_eq!(outcome.to_string(), "2 succeeded, 1 failed");
    assert_eq!(outcome.errors, vec!["logo.png: rejected by validation"]);

    running.watching().await;
    let summary = running.stop().await.unwrap();
    assert_eq!(summary.files_synced, 2);
    assert_eq!(summary.files_failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_file_is_deleted_remotely() {
    let dir = theme();
    fs::create_dir(dir.path().join("snippets")).unwrap();
    fs::write(dir.path().join("snippets/old.liquid"), "old").unwrap();

    let remote = Arc::new(RecordingRemote::default());
    let mut running = start(config(dir.path()), remote.clone());
    running.watching().await;

    fs::remove_file(dir.path().join("snippets/old.liquid")).unwrap();
    running
        .wait_for(|e| matches!(e, EngineEvent::Deleted(_)))
        .await;

    assert_eq!(remote.deletes(), vec![vec!["snippets/old.liquid".to_string()]]);
    let summary = running.stop().await.unwrap();
    assert_eq!(summary.files_deleted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removing_node_modules_sends_no_delete() {
    let dir = theme();
    fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
    fs::write(dir.path().join("node_modules/pkg/index.js"), "").unwrap();

    let remote = Arc::new(RecordingRemote::default());
    let mut running = start(config(dir.path()), remote.clone());
    running.watching().await;

    fs::remove_dir_all(dir.path().join("node_modules")).unwrap();
    fs::write(dir.path().join("tokens.json"), "{}").unwrap();
    eventually(|| remote.syncs().len() == 2).await;
    sleep(Duration::from_millis(600)).await;

    assert!(remote.deletes().is_empty(), "{:?}", remote.deletes());
    running.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn renamed_directory_keeps_syncing() {
    let dir = theme();
    fs::create_dir(dir.path().join("sections")).unwrap();
    fs::write(dir.path().join("sections/a.liquid"), "v0").unwrap();

    let remote = Arc::new(RecordingRemote::default());
    let mut running = start(config(dir.path()), remote.clone());
    running.watching().await;

    fs::rename(dir.path().join("sections"), dir.path().join("blocks")).unwrap();
    eventually(|| !remote.deletes().is_empty()).await;
    assert_eq!(remote.deletes(), vec![vec!["sections/a.liquid".to_string()]]);

    eventually(|| {
        remote
            .syncs()
            .iter()
            .flatten()
            .any(|f| f.path == "blocks/a.liquid")
    })
    .await;
    sleep(Duration::from_millis(300)).await;

    fs::write(dir.path().join("blocks/a.liquid"), "v1").unwrap();
    eventually(|| {
        remote
            .syncs()
            .iter()
            .flatten()
            .any(|f| f.path == "blocks/a.liquid" && f.content == "v1")
    })
    .await;

    running.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_changes_are_flushed_on_shutdown() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote::default());
    let config = EngineConfig {
        // Long enough that only shutdown can flush it.
        debounce: Duration::from_secs(30),
        ..config(dir.path())
    };
    let mut running = start(config, remote.clone());
    running.watching().await;

    fs::write(dir.path().join("tokens.json"), "{\"late\": true}").unwrap();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(remote.syncs().len(), 1);

    running.stop().await.unwrap();

    let calls = remote.calls();
    let syncs = remote.syncs();
    assert_eq!(syncs.len(), 2);
    assert_eq!(syncs[1][0].content, "{\"late\": true}");
    assert!(matches!(calls.last(), Some(Call::Disconnect)));
}

#[tokio::test]
async fn missing_theme_root_fails_before_connecting() {
    let dir = TempDir::new().unwrap();
    let remote = Arc::new(RecordingRemote::default());
    let engine = SyncEngine::new(config(&dir.path().join("missing")), remote.clone());

    let err = engine
        .run(Credentials::new("dev", "secret"), Shutdown::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::ThemeRootNotFound(_))
    ));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn unreadable_manifest_fails_before_connecting() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("manifest.json"), "{ not json").unwrap();
    let remote = Arc::new(RecordingRemote::default());
    let engine = SyncEngine::new(config(dir.path()), remote.clone());

    let err = engine
        .run(Credentials::new("dev", "secret"), Shutdown::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::InvalidManifest { .. })
    ));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn shutdown_before_connect_skips_session() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote::default());
    let engine = SyncEngine::new(config(dir.path()), remote.clone());

    let shutdown = Shutdown::new();
    shutdown.trigger();
    let summary = engine
        .run(Credentials::new("dev", "secret"), shutdown)
        .await
        .unwrap();

    assert_eq!(summary, RunSummary::default());
    assert!(remote.calls().is_empty());
    assert_eq!(engine.state(), EngineState::Terminated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_while_connecting_closes_the_late_session() {
    let dir = theme();
    let remote = Arc::new(RecordingRemote {
        connect_delay: Some(Duration::from_millis(300)),
        ..RecordingRemote::default()
    });
    let running = start(config(dir.path()), remote.clone());

    eventually(|| !remote.calls().is_empty()).await;
    let engine = Arc::clone(&running.engine);
    let summary = running.stop().await.unwrap();

    assert_eq!(summary, RunSummary::default());
    let calls = remote.calls();
    assert!(matches!(calls[..], [Call::Connect, Call::Disconnect]), "{calls:?}");
    assert_eq!(engine.state(), EngineState::Terminated);
}
