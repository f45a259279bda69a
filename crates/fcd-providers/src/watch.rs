//! Debounced filesystem watcher
//!
//! # Overview
//! Bridges `notify` events into debounced [`ChangeSet`]s: all events for
//! the same path inside the debounce window collapse into one entry, and
//! per-path histories merge (create followed by remove inside one window
//! is a no-op). Platform rename events with both paths become `renamed`
//! pairs directly; split rename halves surface as remove + add, which the
//! lifecycle engine re-pairs through fingerprints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use fcd_domain::Error;
use fcd_domain::constants::store::FOLDER_DATA_DIR;
use fcd_domain::error::Result;
use fcd_domain::ports::{ChangeSet, ChangeStream, ChangeWatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Added,
    Modified,
    Removed,
}

/// notify-backed watcher with a configurable debounce window
pub struct NotifyChangeWatcher {
    debounce: Duration,
}

impl NotifyChangeWatcher {
    /// Watcher with the given debounce window
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self { debounce }
    }

    fn relative(root: &Path, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(root).ok()?;
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if rel_str.is_empty()
            || rel_str.starts_with(FOLDER_DATA_DIR)
            || rel_str.split('/').any(|part| part == ".git")
        {
            return None;
        }
        Some(rel_str)
    }

    fn merge(existing: Option<PendingKind>, incoming: PendingKind) -> Option<PendingKind> {
        match (existing, incoming) {
            // Created and removed inside one window: nothing happened
            (Some(PendingKind::Added), PendingKind::Removed) => None,
            (Some(PendingKind::Added), _) => Some(PendingKind::Added),
            // Removed then recreated: content may differ
            (Some(PendingKind::Removed), PendingKind::Added | PendingKind::Modified) => {
                Some(PendingKind::Modified)
            }
            (_, incoming) => Some(incoming),
        }
    }
}

#[async_trait]
impl ChangeWatcher for NotifyChangeWatcher {
    async fn watch(&self, root: &Path) -> Result<Box<dyn ChangeStream>> {
        // Events arrive with resolved paths; match against the same form
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let root = root.as_path();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            })
            .map_err(|e| Error::io_with_source("cannot create filesystem watcher", e))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| {
                Error::io_with_source(format!("cannot watch {}", root.display()), e)
            })?;

        let (set_tx, set_rx) = mpsc::channel::<ChangeSet>(16);
        let task = tokio::spawn(debounce_loop(
            root.to_path_buf(),
            self.debounce,
            raw_rx,
            set_tx,
        ));

        Ok(Box::new(NotifyChangeStream {
            rx: set_rx,
            _watcher: watcher,
            task,
        }))
    }
}

async fn debounce_loop(
    root: PathBuf,
    debounce: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<Event>,
    set_tx: mpsc::Sender<ChangeSet>,
) {
    let mut pending: HashMap<String, PendingKind> = HashMap::new();
    let mut renamed: Vec<(String, String)> = Vec::new();
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        let sleep_until = deadline.unwrap_or_else(|| {
            tokio::time::Instant::now() + Duration::from_secs(60 * 60)
        });
        tokio::select! {
            event = raw_rx.recv() => {
                let Some(event) = event else { break };
                if classify(&root, &event, &mut pending, &mut renamed) && deadline.is_none() {
                    deadline = Some(tokio::time::Instant::now() + debounce);
                }
            }
            () = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                let set = drain(&mut pending, &mut renamed);
                deadline = None;
                if !set.is_empty() {
                    debug!(
                        added = set.added.len(),
                        modified = set.modified.len(),
                        removed = set.removed.len(),
                        renamed = set.renamed.len(),
                        "change set flushed"
                    );
                    if set_tx.send(set).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

fn classify(
    root: &Path,
    event: &Event,
    pending: &mut HashMap<String, PendingKind>,
    renamed: &mut Vec<(String, String)>,
) -> bool {
    // Directories produce their own events; only files matter here
    let is_relevant = |path: &Path| path.is_file() || !path.exists();

    let kind = match event.kind {
        EventKind::Create(_) => Some(PendingKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if event.paths.len() == 2
                && let (Some(from), Some(to)) = (
                    NotifyChangeWatcher::relative(root, &event.paths[0]),
                    NotifyChangeWatcher::relative(root, &event.paths[1]),
                )
            {
                trace!(%from, %to, "rename observed");
                renamed.push((from, to));
                return true;
            }
            None
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(PendingKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(PendingKind::Added),
        EventKind::Modify(_) => Some(PendingKind::Modified),
        EventKind::Remove(_) => Some(PendingKind::Removed),
        _ => None,
    };

    let Some(kind) = kind else { return false };
    let mut touched = false;
    for path in &event.paths {
        if kind != PendingKind::Removed && !is_relevant(path) {
            continue;
        }
        let Some(rel) = NotifyChangeWatcher::relative(root, path) else {
            continue;
        };
        let merged = NotifyChangeWatcher::merge(pending.get(&rel).copied(), kind);
        match merged {
            Some(k) => {
                pending.insert(rel, k);
            }
            None => {
                pending.remove(&rel);
            }
        }
        touched = true;
    }
    touched
}

fn drain(
    pending: &mut HashMap<String, PendingKind>,
    renamed: &mut Vec<(String, String)>,
) -> ChangeSet {
    let mut set = ChangeSet {
        renamed: std::mem::take(renamed),
        ..ChangeSet::default()
    };
    for (path, kind) in pending.drain() {
        match kind {
            PendingKind::Added => set.added.push(path),
            PendingKind::Modified => set.modified.push(path),
            PendingKind::Removed => set.removed.push(path),
        }
    }
    set.added.sort();
    set.modified.sort();
    set.removed.sort();
    set
}

struct NotifyChangeStream {
    rx: mpsc::Receiver<ChangeSet>,
    // Dropping the watcher unregisters the OS watches
    _watcher: notify::RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for NotifyChangeStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl ChangeStream for NotifyChangeStream {
    async fn next_changes(&mut self) -> Option<ChangeSet> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_collapses_create_remove() {
        assert_eq!(
            NotifyChangeWatcher::merge(Some(PendingKind::Added), PendingKind::Removed),
            None
        );
    }

    #[test]
    fn merge_keeps_added_over_modify() {
        assert_eq!(
            NotifyChangeWatcher::merge(Some(PendingKind::Added), PendingKind::Modified),
            Some(PendingKind::Added)
        );
    }

    #[test]
    fn merge_remove_then_create_is_modify() {
        assert_eq!(
            NotifyChangeWatcher::merge(Some(PendingKind::Removed), PendingKind::Added),
            Some(PendingKind::Modified)
        );
    }

    #[test]
    fn relative_excludes_store_dir() {
        let root = Path::new("/data/corpus");
        assert!(NotifyChangeWatcher::relative(root, Path::new("/data/corpus/.fcd/index.db")).is_none());
        assert_eq!(
            NotifyChangeWatcher::relative(root, Path::new("/data/corpus/docs/a.txt")),
            Some("docs/a.txt".to_owned())
        );
    }

    #[tokio::test]
    async fn events_within_window_collapse_into_one_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let watcher = NotifyChangeWatcher::new(Duration::from_millis(200));
        let mut stream = watcher.watch(dir.path()).await.expect("watch");

        std::fs::write(dir.path().join("a.txt"), "one").expect("write");
        std::fs::write(dir.path().join("a.txt"), "two").expect("write");
        std::fs::write(dir.path().join("b.txt"), "three").expect("write");

        let set = tokio::time::timeout(Duration::from_secs(5), stream.next_changes())
            .await
            .expect("flush within timeout")
            .expect("stream alive");
        let mut touched: Vec<&String> = set.added.iter().chain(set.modified.iter()).collect();
        touched.sort();
        touched.dedup();
        assert!(touched.iter().any(|p| p.as_str() == "a.txt"));
        assert!(touched.iter().any(|p| p.as_str() == "b.txt"));
    }
}
