//! Worker pool management
//!
//! A [`WorkerPool`] spawns N tokio tasks that drain a shared queue of
//! archives. Each archive's pipeline runs under `catch_unwind`, so a panic is
//! recorded as a failed outcome and the worker moves on. Reports travel back
//! over an mpsc channel; the pool itself never aggregates them.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::WorkerConfig;
use super::core::IngestWorker;
use super::types::{FileReport, PoolState};
use crate::app::catalog::Catalog;
use crate::app::models::{RemoteArchiveEntry, Server};
use crate::app::store::ObjectStore;
use crate::errors::{AppError, Result};

type SharedQueue = Arc<Mutex<VecDeque<RemoteArchiveEntry>>>;

/// Pool of pipeline workers for one period
#[derive(Debug)]
pub struct WorkerPool {
    config: Arc<WorkerConfig>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    server: Server,
    /// Worker task handles
    handles: Vec<JoinHandle<()>>,
    state: PoolState,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
        server: Server,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            catalog,
            server,
            handles: Vec::new(),
            state: PoolState::Created,
        }
    }

    /// Spawn workers over `entries`, returning how many were started
    ///
    /// No more workers than entries are spawned. Each worker sends one
    /// [`FileReport`] per archive; the channel closes once every worker is
    /// done and the caller's own sender is dropped.
    pub fn start(
        &mut self,
        entries: Vec<RemoteArchiveEntry>,
        report_tx: mpsc::Sender<FileReport>,
    ) -> Result<usize> {
        if self.state != PoolState::Created {
            return Err(AppError::generic(format!(
                "Cannot start pool in state: {:?}",
                self.state
            )));
        }

        let worker_count = self.config.worker_count.min(entries.len());
        let queue: SharedQueue = Arc::new(Mutex::new(VecDeque::from(entries)));

        for id in 0..worker_count {
            let worker = IngestWorker::new(
                id as u32,
                Arc::clone(&self.config),
                Arc::clone(&self.store),
                Arc::clone(&self.catalog),
                self.server,
            );
            let handle = tokio::spawn(run_worker(worker, Arc::clone(&queue), report_tx.clone()));
            self.handles.push(handle);
        }

        self.state = PoolState::Running;
        info!("Worker pool started with {} workers", worker_count);
        Ok(worker_count)
    }

    /// Wait for every worker, returning how many ended abnormally
    pub async fn join(mut self) -> usize {
        let mut failed = 0;
        for handle in self.handles.drain(..) {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Worker task cancelled"),
                Err(e) => {
                    warn!("Worker task ended abnormally: {}", e);
                    failed += 1;
                }
            }
        }
        self.state = PoolState::Finished;
        failed
    }

    /// Abort all workers; in-flight archives keep their scratch files
    pub fn abort(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.state = PoolState::Finished;
        warn!("Aborted {} workers", self.handles.len());
    }

    pub fn state(&self) -> PoolState {
        self.state
    }
}

impl Drop for WorkerPool {
    /// Abort workers that were never joined
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn run_worker(worker: IngestWorker, queue: SharedQueue, report_tx: mpsc::Sender<FileReport>) {
    debug!("Worker {} starting", worker.id());
    let mut processed = 0usize;

    loop {
        let next = queue.lock().await.pop_front();
        let Some(entry) = next else {
            break;
        };

        let report = match AssertUnwindSafe(worker.process(&entry)).catch_unwind().await {
            Ok(report) => report,
            Err(payload) => {
                worker
                    .recover_from_panic(&entry, &panic_message(payload.as_ref()))
                    .await
            }
        };

        processed += 1;
        if report_tx.send(report).await.is_err() {
            debug!("Worker {} stopping, report receiver closed", worker.id());
            break;
        }
    }

    debug!("Worker {} finished after {} archives", worker.id(), processed);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
