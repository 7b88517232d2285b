//! Per-path change coalescing.
//!
//! Each path owns at most one pending timer. Registering a path again
//! aborts its timer and starts a new one, so a burst of events collapses
//! into a single emission once the path has been quiet for the window.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Scheduled flush for one path.
#[derive(Debug)]
struct PendingChange {
    generation: u64,
    handle: JoinHandle<()>,
}

type TimerTable = Arc<Mutex<HashMap<String, PendingChange>>>;

/// Coalesces bursts of events per path into one emission after a quiet window.
///
/// Timers run on the ambient tokio runtime; `register` must be called from
/// within one.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    timers: TimerTable,
    next_generation: AtomicU64,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)schedule `emit` to run once `path` has been quiet for the window.
    ///
    /// A pending timer for the same path is cancelled and replaced; its
    /// `emit` never runs.
    pub fn register<F>(&self, path: impl Into<String>, emit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let path = path.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let window = self.window;
        let timers = Arc::clone(&self.timers);
        let key = path.clone();

        // The table stays locked until the new entry is in place, so the
        // timer can never observe the table without its own generation.
        let mut table = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let current = {
                let mut table = timers.lock();
                match table.get(&key) {
                    Some(pending) if pending.generation == generation => {
                        table.remove(&key);
                        true
                    }
                    _ => false,
                }
            };

            if current {
                emit();
            }
        });

        if let Some(previous) = table.insert(path, PendingChange { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel the pending timer for `path`. Returns whether one existed.
    pub fn cancel(&self, path: &str) -> bool {
        match self.timers.lock().remove(path) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer without emitting.
    pub fn cancel_all(&self) {
        for (_, pending) in self.timers.lock().drain() {
            pending.handle.abort();
        }
    }

    /// Cancel every pending timer and return the paths that were waiting,
    /// sorted, so the caller can flush them itself.
    pub fn drain(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .timers
            .lock()
            .drain()
            .map(|(path, pending)| {
                pending.handle.abort();
                path
            })
            .collect();
        paths.sort();
        paths
    }

    pub fn pending(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.timers.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn pending_count(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_pending(&self, path: &str) -> bool {
        self.timers.lock().contains_key(path)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
