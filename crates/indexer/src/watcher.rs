use crate::error::{IndexerError, Result};
use crate::indexer::Indexer;
use crate::scanner::FileScanner;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Forwards file-system changes under a project root into an indexing queue
///
/// Only paths the scanner would pick up are forwarded. Dropping the
/// watcher stops the notifications.
pub struct FileWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    pub fn start(
        indexer: &Indexer,
        root: impl AsRef<Path>,
        queue: mpsc::UnboundedSender<PathBuf>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let filter = EventFilter::new(indexer.scanner(&root)?)?;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for path in filter.relevant_paths(&event) {
                        log::debug!("Queued {} ({:?})", path.display(), event.kind);
                        if queue.send(path).is_err() {
                            log::warn!("Indexing queue closed; dropping file event");
                            break;
                        }
                    }
                }
                Err(err) => log::warn!("Watcher error: {err}"),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| IndexerError::Watcher(format!("watcher init failed: {e}")))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| IndexerError::Watcher(format!("failed to watch {}: {e}", root.display())))?;

        log::info!("Watching {} for changes", root.display());
        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Maps raw notify events to indexable paths spelled relative to the scan root
struct EventFilter {
    scanner: FileScanner,
    canonical_root: PathBuf,
}

impl EventFilter {
    fn new(scanner: FileScanner) -> Result<Self> {
        let canonical_root = std::fs::canonicalize(scanner.root()).map_err(|e| {
            IndexerError::InvalidPath(format!("{}: {e}", scanner.root().display()))
        })?;
        Ok(Self {
            scanner,
            canonical_root,
        })
    }

    fn relevant_paths(&self, event: &Event) -> Vec<PathBuf> {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return Vec::new();
        }

        let mut out: Vec<PathBuf> = Vec::new();
        for path in &event.paths {
            // notify reports canonical paths; chunk ids use the root as given
            let path = match path.strip_prefix(&self.canonical_root) {
                Ok(relative) => self.scanner.root().join(relative),
                Err(_) => path.clone(),
            };
            if self.scanner.accepts(&path) && !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }
}
