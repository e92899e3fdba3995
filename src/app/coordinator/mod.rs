//! Ingestion orchestration
//!
//! The coordinator is the control plane of a run. For every period it lists
//! the archives under the resolved prefix, drops oversized ones, reconciles
//! the rest against the catalog and hands what is left to a [`WorkerPool`].
//! Worker reports are folded into the period's statistics here and nowhere
//! else.
//!
//! - [`config`] - Run configuration
//! - [`stats`] - Counts and period/run summaries
//! - [`progress`] - Progress events for the CLI display
//! - [`signals`] - CTRL-C/SIGTERM handling
//!
//! A period that fails (listing error, for instance) is recorded and the run
//! moves on to the next one. An interrupt ends the whole run with
//! [`AppError::Interrupted`].

pub mod config;
pub mod progress;
pub mod signals;
pub mod stats;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::catalog::Catalog;
use crate::app::folder::{resolve_period, PeriodRequest};
use crate::app::lister::list_archives;
use crate::app::models::{FolderReference, ProcessingOutcome, RemoteArchiveEntry, Server};
use crate::app::reconcile::reconcile;
use crate::app::store::ObjectStore;
use crate::app::worker::WorkerPool;
use crate::errors::{AppError, ConfigResult, Result};

pub use config::CoordinatorConfig;
pub use progress::{progress_channel, ProgressEvent, ProgressSink};
pub use signals::{create_shutdown_channel, SignalHandler};
pub use stats::{format_duration, IngestStats, PeriodStatus, PeriodSummary, RunSummary};

/// Main coordinator for ingestion runs
pub struct Coordinator {
    config: CoordinatorConfig,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    progress: ProgressSink,
    shutdown_tx: broadcast::Sender<()>,
}

impl Coordinator {
    /// Create a new coordinator over shared store and catalog clients
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();
        Self {
            config,
            store,
            catalog,
            progress: ProgressSink::disabled(),
            shutdown_tx,
        }
    }

    /// Send progress events to `sink`
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    /// Sender that interrupts the run when signalled
    pub fn shutdown_trigger(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Interrupt the run on CTRL-C or SIGTERM
    pub fn install_signal_handler(&self) -> JoinHandle<()> {
        SignalHandler::new(self.shutdown_tx.clone()).setup()
    }

    /// Resolve every period, then ingest them in order
    ///
    /// # Errors
    ///
    /// Configuration errors surface before any period is touched;
    /// `Interrupted` when a shutdown signal arrives mid-run. Period failures
    /// are reported in the summary instead.
    pub async fn run(&self, periods: &[PeriodRequest], server: Server) -> Result<RunSummary> {
        self.config.validate()?;
        let folders = periods
            .iter()
            .map(|period| resolve_period(period, server))
            .collect::<ConfigResult<Vec<_>>>()?;
        self.run_folders(&folders).await
    }

    /// Ingest already resolved folders in order
    ///
    /// An invalid configuration is rejected before any folder is listed.
    pub async fn run_folders(&self, folders: &[FolderReference]) -> Result<RunSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut summary = RunSummary::default();

        info!(
            "Starting ingestion of {} period(s) with {} workers",
            folders.len(),
            self.config.worker.worker_count
        );

        for folder in folders {
            let result = tokio::select! {
                result = self.run_period(folder) => result,
                _ = shutdown.recv() => {
                    warn!("Run interrupted during {}", folder.batch_label);
                    return Err(AppError::Interrupted);
                }
            };

            match result {
                Ok(period) => {
                    info!("{}: {}", period.batch_label, period.stats);
                    summary.push(period);
                }
                Err(AppError::Interrupted) => return Err(AppError::Interrupted),
                Err(e) => {
                    error!("Period {} failed: {}", folder.batch_label, e);
                    summary.push(PeriodSummary::failed(
                        &folder.batch_label,
                        &folder.prefix,
                        e.to_string(),
                    ));
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            "Ingestion finished: {} period(s), {}",
            summary.periods.len(),
            summary.totals
        );
        Ok(summary)
    }

    /// List, filter, reconcile and process one period
    pub async fn run_period(&self, folder: &FolderReference) -> Result<PeriodSummary> {
        self.config.validate()?;
        let started = Instant::now();
        info!(
            "Listing {} ({} {} content)",
            folder.prefix, folder.server, folder.era
        );

        let listed = list_archives(
            self.store.as_ref(),
            folder,
            &self.config.extension,
            self.config.limit,
        )
        .await?;

        let mut stats = IngestStats {
            total_candidates: listed.len(),
            ..Default::default()
        };

        let (candidates, oversized): (Vec<_>, Vec<_>) = listed
            .into_iter()
            .partition(|entry| !self.config.exceeds_max_size(entry.size_bytes));
        stats.filtered_by_size = oversized.len();
        for entry in &oversized {
            debug!("Skipping {} ({} bytes exceeds maximum)", entry.key, entry.size_bytes);
        }

        let pending = if self.config.force {
            info!("Force mode: processing all {} candidates", candidates.len());
            candidates
        } else {
            let reconciliation =
                reconcile(self.catalog.as_ref(), &candidates, self.config.reconcile).await;
            if reconciliation.unresolved > 0 {
                warn!(
                    "{} keys could not be checked against the catalog and will be attempted",
                    reconciliation.unresolved
                );
            }
            let (pending, registered) = reconciliation.partition(candidates);
            stats.already_processed = registered.len();
            pending
        };

        info!(
            "{}: {} listed, {} too large, {} already registered, {} pending",
            folder.batch_label,
            stats.total_candidates,
            stats.filtered_by_size,
            stats.already_processed,
            pending.len()
        );
        self.progress.emit(ProgressEvent::PeriodStarted {
            batch_label: folder.batch_label.clone(),
            pending: pending.len(),
        });

        let (status, outcomes, pending_keys) = if self.config.dry_run {
            let keys = pending.into_iter().map(|entry| entry.key).collect();
            (PeriodStatus::DryRun, Vec::new(), keys)
        } else {
            let outcomes = self.process(folder, pending, &mut stats).await?;
            (PeriodStatus::Completed, outcomes, Vec::new())
        };

        stats.elapsed = started.elapsed();
        self.progress.emit(ProgressEvent::PeriodFinished {
            batch_label: folder.batch_label.clone(),
            stats: stats.clone(),
        });

        Ok(PeriodSummary {
            batch_label: folder.batch_label.clone(),
            prefix: folder.prefix.clone(),
            status,
            stats,
            outcomes,
            pending: pending_keys,
        })
    }

    /// Run the worker pool over `pending`, folding reports into `stats`
    async fn process(
        &self,
        folder: &FolderReference,
        pending: Vec<RemoteArchiveEntry>,
        stats: &mut IngestStats,
    ) -> Result<Vec<ProcessingOutcome>> {
        let mut outcomes = Vec::with_capacity(pending.len());
        if pending.is_empty() {
            return Ok(outcomes);
        }

        let mut pool = WorkerPool::new(
            self.config.worker.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.catalog),
            folder.server,
        );
        let (report_tx, mut report_rx) = mpsc::channel(self.config.worker.report_buffer_size);
        pool.start(pending, report_tx)?;

        while let Some(report) = report_rx.recv().await {
            stats.record(&report);
            self.progress.emit(ProgressEvent::FileFinished {
                batch_label: folder.batch_label.clone(),
                outcome: report.outcome.clone(),
            });
            outcomes.push(report.outcome);
        }

        let abnormal = pool.join().await;
        if abnormal > 0 {
            warn!("{} workers ended abnormally in {}", abnormal, folder.batch_label);
        }

        outcomes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::app::archive::test_support::meca;
    use crate::app::catalog::MemoryCatalog;
    use crate::app::folder::resolve_folder;
    use crate::app::store::{ByteRange, ListPage, MemoryStore, ObjectHead};
    use crate::app::worker::WorkerConfigBuilder;
    use crate::errors::{ConfigError, TransportResult};

    fn populate(store: &MemoryStore, period: &str, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let key = format!("Current_Content/{period}/{period}-{i}.meca");
                store.insert(
                    Server::Biorxiv,
                    key.clone(),
                    meca(&format!("10.1101/{period}.{i}")),
                );
                key
            })
            .collect()
    }

    fn config(dir: &Path) -> CoordinatorConfig {
        CoordinatorConfig {
            worker: WorkerConfigBuilder::new().output_dir(dir).build().unwrap(),
            ..Default::default()
        }
    }

    fn january() -> FolderReference {
        resolve_folder(Some("2024-01"), None, Server::Biorxiv).unwrap()
    }

    #[tokio::test]
    async fn test_period_skips_registered_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let keys = populate(&store, "January_2024", 3);
        catalog.seed("10.1101/January_2024.0", 1, "January_2024", &keys[0]);
        store.insert(
            Server::Biorxiv,
            "Current_Content/January_2024/huge.meca",
            vec![0u8; 1_000_000],
        );

        let coordinator = Coordinator::new(
            config(dir.path()).with_max_file_size(Some(100_000)),
            store,
            catalog.clone(),
        );
        let summary = coordinator.run_period(&january()).await.unwrap();

        assert_eq!(summary.status, PeriodStatus::Completed);
        assert_eq!(summary.stats.total_candidates, 4);
        assert_eq!(summary.stats.filtered_by_size, 1);
        assert_eq!(summary.stats.already_processed, 1);
        assert_eq!(summary.stats.succeeded, 2);
        assert_eq!(summary.stats.failed, 0);
        assert_eq!(summary.keys_where(true), vec![keys[1].as_str(), keys[2].as_str()]);
        assert_eq!(catalog.registrations(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let keys = populate(&store, "January_2024", 2);

        let coordinator = Coordinator::new(
            config(dir.path()).with_dry_run(true),
            store.clone(),
            catalog.clone(),
        );
        let summary = coordinator.run_period(&january()).await.unwrap();

        assert_eq!(summary.status, PeriodStatus::DryRun);
        assert_eq!(summary.pending, keys);
        assert!(summary.outcomes.is_empty());
        assert_eq!(store.downloads(), 0);
        assert_eq!(catalog.registrations(), 0);
    }

    #[tokio::test]
    async fn test_force_bypasses_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let keys = populate(&store, "January_2024", 2);
        catalog.seed("10.1101/January_2024.0", 1, "January_2024", &keys[0]);

        let coordinator = Coordinator::new(config(dir.path()).with_force(true), store, catalog.clone());
        let summary = coordinator.run_period(&january()).await.unwrap();

        assert_eq!(summary.stats.already_processed, 0);
        assert_eq!(summary.stats.succeeded, 2);
        assert_eq!(summary.stats.duplicates, 1);
        assert_eq!(catalog.conflicts(), 1);
    }

    #[tokio::test]
    async fn test_failed_period_does_not_stop_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        populate(&store, "February_2024", 1);
        let coordinator = Coordinator::new(
            config(dir.path()),
            store.clone(),
            Arc::new(MemoryCatalog::new()),
        );

        store.fail_listing(true);
        let periods = [
            PeriodRequest::Month { year: 2024, month: 1 },
            PeriodRequest::Month { year: 2024, month: 2 },
        ];
        let summary = coordinator.run(&periods, Server::Biorxiv).await.unwrap();

        assert_eq!(summary.periods.len(), 2);
        assert_eq!(summary.failed_periods(), 2);
        assert!(summary.has_failures());
    }

    #[tokio::test]
    async fn test_back_content_month_is_fatal_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let coordinator = Coordinator::new(config(dir.path()), store.clone(), Arc::new(MemoryCatalog::new()));

        let periods = [
            PeriodRequest::Month { year: 2024, month: 1 },
            PeriodRequest::Month { year: 2017, month: 5 },
        ];
        let err = coordinator.run(&periods, Server::Biorxiv).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Config(ConfigError::BackContentMonth { .. })
        ));
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected_before_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        populate(&store, "January_2024", 1);
        let mut config = config(dir.path());
        config.worker.worker_count = 0;
        let coordinator = Coordinator::new(config, store.clone(), Arc::new(MemoryCatalog::new()));

        let err = coordinator.run_folders(&[january()]).await.unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::InvalidValue { .. })));
        assert_eq!(store.list_calls(), 0);
        assert_eq!(store.downloads(), 0);
    }

    #[tokio::test]
    async fn test_zero_report_buffer_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        populate(&store, "January_2024", 1);
        let mut config = config(dir.path());
        config.worker.report_buffer_size = 0;
        let coordinator = Coordinator::new(config, store.clone(), Arc::new(MemoryCatalog::new()));

        let err = coordinator.run_period(&january()).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        populate(&store, "January_2024", 2);
        let (sink, mut rx) = progress_channel();

        let coordinator = Coordinator::new(config(dir.path()), store, Arc::new(MemoryCatalog::new()))
            .with_progress(sink);
        coordinator.run_folders(&[january()]).await.unwrap();
        drop(coordinator);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ProgressEvent::PeriodStarted { pending: 2, .. }));
        assert!(matches!(events[3], ProgressEvent::PeriodFinished { .. }));
    }

    /// Store whose downloads never finish in test time
    #[derive(Debug)]
    struct StalledStore(MemoryStore);

    #[async_trait]
    impl ObjectStore for StalledStore {
        async fn list_page(
            &self,
            server: Server,
            prefix: &str,
            continuation: Option<String>,
            max_keys: i32,
        ) -> TransportResult<ListPage> {
            self.0.list_page(server, prefix, continuation, max_keys).await
        }

        async fn head(&self, server: Server, key: &str) -> TransportResult<ObjectHead> {
            self.0.head(server, key).await
        }

        async fn get_range(
            &self,
            server: Server,
            key: &str,
            range: ByteRange,
        ) -> TransportResult<Vec<u8>> {
            self.0.get_range(server, key, range).await
        }

        async fn download_to(
            &self,
            _server: Server,
            _key: &str,
            _destination: &Path,
        ) -> TransportResult<u64> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_interrupt_ends_run() {
        let dir = tempfile::tempdir().unwrap();
        let inner = MemoryStore::new();
        populate(&inner, "January_2024", 2);
        let coordinator = Coordinator::new(
            config(dir.path()),
            Arc::new(StalledStore(inner)),
            Arc::new(MemoryCatalog::new()),
        );

        let trigger = coordinator.shutdown_trigger();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = trigger.send(());
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            coordinator.run_folders(&[january()]),
        )
        .await
        .expect("interrupt should end the run promptly");
        assert!(matches!(result, Err(AppError::Interrupted)));
    }
}
