//! Live theme synchronization.
//!
//! Keeps a local theme directory and a remote storefront's dev theme in
//! step: connect a dev session, push every file once, then watch the tree
//! and push each settled, debounced change until shutdown.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use themekit_sync::{Credentials, EngineConfig, HttpRemote, Shutdown, SyncEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = HttpRemote::new("https://shop.example.com", Duration::from_secs(30))?;
//! let engine = SyncEngine::new(EngineConfig::new("./theme"), Arc::new(remote));
//!
//! let shutdown = Shutdown::new();
//! let summary = engine
//!     .run(Credentials::new("dev@example.com", "secret"), shutdown)
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod filter;
pub mod remote;
pub mod session;
pub mod watcher;

pub use classify::{BINARY_EXTENSIONS, ClassifiedContent, Encoding, FileChange, checksum, classify};
pub use debounce::Debouncer;
pub use engine::{EngineConfig, EngineEvent, EngineState, RunSummary, Shutdown, SyncEngine};
pub use error::{EngineError, RemoteError, SessionError, WatchError};
pub use filter::{DEFAULT_IGNORES, WatchFilter, collect_files};
pub use remote::{
    BatchOutcome, ClientInfo, ConnectRequest, ConnectResponse, HttpRemote, ReloadHint,
    SESSION_HEADER, SyncResult, ThemeRemote, ValidationReport,
};
pub use session::{Credentials, DevSession, SessionManager, SessionState};
pub use watcher::{ThemeWatcher, WatchEvent, WatchEventKind};
