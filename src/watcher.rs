use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, info, warn};

use crate::collector;
use crate::db::Database;
use crate::indexer::Indexer;

/// Per-path quiet window before a change is surfaced.
const DEBOUNCE: Duration = Duration::from_millis(200);
/// Poll cadence for debounce flushing and write-stability checks.
const POLL: Duration = Duration::from_millis(50);
/// How long size+mtime must hold still before a file counts as written out.
const STABLE_FOR: Duration = Duration::from_millis(200);
/// Upper bound on the stability wait so a steadily-growing file cannot
/// stall the loop.
const STABILITY_CAP: Duration = Duration::from_secs(2);

/// Watches a project root and surfaces debounced, per-path-coalesced change
/// batches for supported files. Uses the platform-native notify backend.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Vec<PathBuf>>,
}

impl FileWatcher {
    pub fn new(root: &Path) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel::<Event>();
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<PathBuf>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = raw_tx.send(event);
                }
            },
            Config::default(),
        )
        .context("failed to create filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;

        // Debounce thread: each path's timer resets on every event; a path
        // is flushed once it has been quiet for the full window.
        std::thread::Builder::new()
            .name("codex-watch-debounce".into())
            .spawn(move || {
                let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
                loop {
                    let timeout = if pending.is_empty() {
                        Duration::from_secs(3600)
                    } else {
                        POLL
                    };
                    match raw_rx.recv_timeout(timeout) {
                        Ok(event) => {
                            if is_relevant(&event.kind) {
                                let now = Instant::now();
                                for path in &event.paths {
                                    if collector::has_supported_extension(path) {
                                        pending.insert(path.clone(), now);
                                    }
                                }
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    }

                    let now = Instant::now();
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, &seen)| now.duration_since(seen) >= DEBOUNCE)
                        .map(|(path, _)| path.clone())
                        .collect();
                    if !ready.is_empty() {
                        for path in &ready {
                            pending.remove(path);
                        }
                        if batch_tx.send(ready).is_err() {
                            return;
                        }
                    }
                }
            })
            .context("failed to spawn debounce thread")?;

        Ok(Self {
            _watcher: watcher,
            rx: batch_rx,
        })
    }

    /// Block until changed files arrive (up to `timeout`). Returns an empty
    /// vec on timeout.
    pub fn wait_for_changes(&self, timeout: Duration) -> Vec<PathBuf> {
        self.rx.recv_timeout(timeout).unwrap_or_default()
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Wait until the file's size and mtime hold still for the stability
/// window. Bounded; a file under constant write wins after the cap.
pub fn wait_for_write_stability(path: &Path) {
    let started = Instant::now();
    let mut snapshot = probe(path);
    let mut stable_since = Instant::now();
    while started.elapsed() < STABILITY_CAP {
        std::thread::sleep(POLL);
        let current = probe(path);
        if current == snapshot {
            if stable_since.elapsed() >= STABLE_FOR {
                return;
            }
        } else {
            snapshot = current;
            stable_since = Instant::now();
        }
    }
}

fn probe(path: &Path) -> Option<(u64, SystemTime)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.len(), meta.modified().ok()?))
}

/// Long-running watch loop: every debounced change goes through the
/// single-file re-index path. The store is locked per file so query
/// handlers interleave with re-index batches. Per-file errors are logged
/// and the loop continues.
pub fn watch_loop(root: &Path, db: Arc<Mutex<Database>>) -> Result<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {}", root.display()))?;
    let watcher = FileWatcher::new(&root)?;
    info!(root = %root.display(), "watching for changes");

    loop {
        let changed = watcher.wait_for_changes(Duration::from_secs(60));
        if changed.is_empty() {
            continue;
        }
        let mut reindexed = 0;
        let mut removed = 0;
        for path in &changed {
            let Ok(rel) = path.strip_prefix(&root) else {
                continue;
            };
            if collector::in_pruned_dir(rel) {
                continue;
            }
            let rel = to_slash(rel);
            let exists = path.exists();
            if exists {
                wait_for_write_stability(path);
            }
            let result = {
                let db = match db.lock() {
                    Ok(db) => db,
                    Err(e) => {
                        error!(error = %e, "failed to lock store for re-index");
                        continue;
                    }
                };
                let mut indexer = Indexer::new(&db);
                indexer.reindex_file(&root, &rel)
            };
            match result {
                Ok(true) => {
                    if exists {
                        reindexed += 1;
                    } else {
                        removed += 1;
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(path = %rel, error = %err, "re-index error"),
            }
        }
        if reindexed > 0 || removed > 0 {
            info!(reindexed, removed, "watcher processed changes");
        }
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
