//! Recursive theme directory watcher.
//!
//! Only non-ignored directories are registered with the OS (one
//! non-recursive watch each), so excluded trees such as `node_modules` are
//! never observed at all. Raw notifications settle through a [`Debouncer`]
//! before they are reported, which keeps half-written files out of the
//! event stream.
//!
//! Directories that appear under any event kind (created, or renamed into
//! place) are adopted and their files reported as added. When a watched
//! directory disappears, every file known beneath it is reported removed.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::error::WatchError;
use crate::filter::{WatchFilter, collect_dirs, collect_files, relative_slash_path};

/// Kind of change reported for a settled file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Added,
    Modified,
    Removed,
}

/// A settled filesystem observation for one regular file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchEvent {
    /// Slash-separated path relative to the theme root
    pub path: String,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<String>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

struct Shared {
    root: PathBuf,
    filter: WatchFilter,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Mutex<HashSet<PathBuf>>,
    /// Root-relative files that currently exist as far as the watcher knows
    known: Mutex<HashSet<String>>,
    /// First raw kind seen for each path in its current stability window
    first_kind: Mutex<HashMap<String, WatchEventKind>>,
    settle: Debouncer,
    events: mpsc::UnboundedSender<WatchEvent>,
}

/// Watches a theme directory and reports settled per-file changes.
pub struct ThemeWatcher {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl ThemeWatcher {
    /// Start watching `root`.
    ///
    /// Returns the watcher together with the receiver of settled events.
    /// The receiver closes once the watcher is dropped.
    ///
    /// # Errors
    ///
    /// Fails when `root` is missing, is not a directory, cannot be listed,
    /// or cannot be registered with the OS watcher.
    pub fn start(
        root: impl AsRef<Path>,
        filter: WatchFilter,
        stability: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatchError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(WatchError::RootNotFound(root.to_path_buf()));
        }
        let root = std::fs::canonicalize(root)?;

        let known: HashSet<String> = collect_files(&root, &filter)?.into_iter().collect();

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.send(res);
        })
        .map_err(|source| WatchError::Notify {
            path: root.clone(),
            source,
        })?;

        let shared = Arc::new(Shared {
            root: root.clone(),
            filter,
            watcher: Mutex::new(Some(watcher)),
            watched: Mutex::new(HashSet::new()),
            known: Mutex::new(known),
            first_kind: Mutex::new(HashMap::new()),
            settle: Debouncer::new(stability),
            events: events_tx,
        });

        // The root itself must be watchable; subdirectories are best-effort.
        shared.watch_dir(&root)?;
        for dir in collect_dirs(&root, &shared.filter)? {
            if dir != root {
                if let Err(e) = shared.watch_dir(&dir) {
                    warn!(error = %e, "skipping directory");
                }
            }
        }

        debug!(
            root = %root.display(),
            dirs = shared.watched.lock().len(),
            "watching theme directory"
        );

        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                match res {
                    Ok(event) => task_shared.handle_event(event),
                    Err(e) => warn!(error = %e, "file watcher error"),
                }
            }
        });

        Ok((Self { shared, task }, events_rx))
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Number of directories currently registered with the OS.
    pub fn watched_dir_count(&self) -> usize {
        self.shared.watched.lock().len()
    }

    /// Stop observing and discard changes that have not settled yet.
    pub fn stop(&self) {
        self.task.abort();
        self.shared.settle.cancel_all();
        self.shared.first_kind.lock().clear();
        self.shared.known.lock().clear();

        let dirs: Vec<PathBuf> = self.shared.watched.lock().drain().collect();
        let mut watcher = self.shared.watcher.lock();
        if let Some(w) = watcher.as_mut() {
            for dir in &dirs {
                let _ = w.unwatch(dir);
            }
        }
        // Dropping the OS watcher closes the raw channel.
        *watcher = None;
    }
}

impl Drop for ThemeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn watch_dir(&self, dir: &Path) -> Result<(), WatchError> {
        let mut watcher = self.watcher.lock();
        let Some(w) = watcher.as_mut() else {
            return Ok(());
        };

        if self.watched.lock().contains(dir) {
            return Ok(());
        }

        w.watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: dir.to_path_buf(),
                source,
            })?;
        self.watched.lock().insert(dir.to_path_buf());
        Ok(())
    }

    /// Unregister `dir` and every watched directory beneath it.
    fn unwatch_tree(&self, dir: &Path) {
        let gone: Vec<PathBuf> = {
            let mut watched = self.watched.lock();
            let gone: Vec<PathBuf> = watched
                .iter()
                .filter(|p| p.starts_with(dir))
                .cloned()
                .collect();
            for p in &gone {
                watched.remove(p);
            }
            gone
        };

        if let Some(w) = self.watcher.lock().as_mut() {
            for p in &gone {
                // The OS may already have dropped the watch with the directory.
                let _ = w.unwatch(p);
            }
        }
    }

    fn handle_event(self: &Arc<Self>, event: Event) {
        let kind = match event.kind {
            EventKind::Create(_) => WatchEventKind::Added,
            EventKind::Modify(_) => WatchEventKind::Modified,
            EventKind::Remove(_) => WatchEventKind::Removed,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return,
        };

        for path in &event.paths {
            let Some(relative) = relative_slash_path(&self.root, path) else {
                continue;
            };

            if path.is_dir() {
                if self.filter.is_ignored(&relative, true) {
                    continue;
                }
                let is_new = !self.watched.lock().contains(path);
                if is_new {
                    self.adopt_dir(path);
                }
                continue;
            }

            let was_watched_dir = self.watched.lock().contains(path);
            if was_watched_dir {
                self.forget_dir(path, &relative);
                continue;
            }

            if !path.exists() {
                // Only report disappearances of files seen before. This also
                // drops removals of ignored directories, which were never
                // watched and never had files recorded.
                let known = self.known.lock().contains(&relative);
                let pending = self.first_kind.lock().contains_key(&relative);
                if !known && !pending {
                    continue;
                }
            }

            if self.filter.is_ignored(&relative, false) {
                continue;
            }

            self.observe(relative, kind);
        }
    }

    /// Start watching a directory that was created or moved in after
    /// startup and report the files already inside it.
    fn adopt_dir(self: &Arc<Self>, dir: &Path) {
        let dirs = match collect_dirs(dir, &self.filter) {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "cannot read new directory");
                return;
            }
        };

        for sub in dirs {
            let Some(relative_dir) = relative_slash_path(&self.root, &sub) else {
                continue;
            };
            if self.filter.is_ignored(&relative_dir, true) {
                continue;
            }
            if let Err(e) = self.watch_dir(&sub) {
                warn!(error = %e, "skipping directory");
                continue;
            }

            let Ok(entries) = std::fs::read_dir(&sub) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(relative) = relative_slash_path(&self.root, &path) {
                    if !self.filter.is_ignored(&relative, false) {
                        self.observe(relative, WatchEventKind::Added);
                    }
                }
            }
        }
    }

    /// A watched directory was removed or moved away: stop watching its
    /// tree and report each file known beneath it as removed.
    fn forget_dir(self: &Arc<Self>, dir: &Path, relative_dir: &str) {
        self.unwatch_tree(dir);

        let prefix = format!("{}/", relative_dir);
        let files: Vec<String> = self
            .known
            .lock()
            .iter()
            .filter(|f| f.starts_with(&prefix))
            .cloned()
            .collect();

        debug!(dir = relative_dir, files = files.len(), "watched directory went away");
        for file in files {
            self.observe(file, WatchEventKind::Removed);
        }
    }

    /// Record a raw observation and (re)start the file's stability timer.
    fn observe(self: &Arc<Self>, relative: String, kind: WatchEventKind) {
        self.first_kind
            .lock()
            .entry(relative.clone())
            .or_insert(kind);

        let shared = Arc::clone(self);
        let key = relative.clone();
        self.settle.register(relative, move || shared.settled(&key));
    }

    /// Emit the final state of a path once writes to it have stopped.
    fn settled(&self, relative: &str) {
        let first = self.first_kind.lock().remove(relative);
        let absolute = self.root.join(relative);

        let exists = absolute.is_file();
        {
            let mut known = self.known.lock();
            if exists {
                known.insert(relative.to_string());
            } else {
                known.remove(relative);
            }
        }

        let kind = match (exists, first) {
            // Created and removed again within one window: nothing happened.
            (false, Some(WatchEventKind::Added)) => return,
            (false, _) => WatchEventKind::Removed,
            (true, Some(WatchEventKind::Added)) => WatchEventKind::Added,
            (true, _) => WatchEventKind::Modified,
        };

        debug!(path = relative, ?kind, "file settled");
        let _ = self.events.send(WatchEvent::new(relative, kind));
    }
}
