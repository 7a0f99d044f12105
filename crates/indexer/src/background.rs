use crate::error::{IndexerError, Result};
use crate::indexer::Indexer;
use crate::stats::FileOutcome;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Upper bound on waiting for the worker during `stop`
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters published by the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    indexed: AtomicUsize,
    unchanged: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            indexed: self.indexed.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Single worker that re-indexes queued files one at a time
///
/// A failing file is logged and counted; the worker keeps draining the queue.
pub struct BackgroundIndexer {
    queue: mpsc::UnboundedSender<PathBuf>,
    stop_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl BackgroundIndexer {
    /// Spawn the worker on the current tokio runtime
    pub fn start(indexer: Arc<Indexer>) -> Self {
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let worker = spawn_worker(indexer, queue_rx, stop_rx, Arc::clone(&counters));
        log::info!("Background indexer started");

        Self {
            queue,
            stop_tx,
            worker: Some(worker),
            counters,
        }
    }

    pub fn queue_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.queue
            .send(path.into())
            .map_err(|_| IndexerError::QueueClosed)
    }

    /// Producer handle for a file watcher
    pub fn sender(&self) -> mpsc::UnboundedSender<PathBuf> {
        self.queue.clone()
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Signal the worker and wait for it, aborting after [`STOP_TIMEOUT`]
    ///
    /// Files still queued when the signal arrives are dropped.
    pub async fn stop(&mut self) -> WorkerStats {
        let _ = self.stop_tx.send(true);
        if let Some(mut worker) = self.worker.take() {
            match tokio::time::timeout(STOP_TIMEOUT, &mut worker).await {
                Ok(Ok(())) => log::info!("Background indexer stopped"),
                Ok(Err(err)) => log::error!("Background indexer task failed: {err}"),
                Err(_) => {
                    log::warn!(
                        "Background indexer did not stop within {}s, aborting",
                        STOP_TIMEOUT.as_secs()
                    );
                    worker.abort();
                }
            }
        }
        self.stats()
    }
}

impl Drop for BackgroundIndexer {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

fn spawn_worker(
    indexer: Arc<Indexer>,
    mut queue_rx: mpsc::UnboundedReceiver<PathBuf>,
    mut stop_rx: watch::Receiver<bool>,
    counters: Arc<Counters>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                next = queue_rx.recv() => {
                    let Some(path) = next else {
                        break;
                    };
                    match indexer.index_file(&path).await {
                        Ok(FileOutcome::Indexed { .. }) => {
                            counters.indexed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(FileOutcome::Unchanged) => {
                            counters.unchanged.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            log::error!("Background indexing of {} failed: {err}", path.display());
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }
    })
}
