//! Core ingest worker implementation
//!
//! An [`IngestWorker`] takes one archive through
//! download → extract → parse → register → cleanup. Every failure is folded
//! into the archive's [`FileReport`]; nothing here aborts the pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::config::WorkerConfig;
use super::types::{ExtractionRoute, FileReport, WorkerStage};
use crate::app::archive::{self, ExtractionStrategy, RangedArchive};
use crate::app::catalog::{Catalog, Registration};
use crate::app::cleanup::{cleanup, ScratchPaths};
use crate::app::jats;
use crate::app::models::{ProcessingOutcome, RegistrationPayload, RemoteArchiveEntry, Server};
use crate::app::store::ObjectStore;
use crate::errors::{AppError, ExtractionError, FailureKind, Result};

/// Pipeline position of the archive being processed
#[derive(Debug, Default)]
struct Progress {
    stage: Option<WorkerStage>,
    route: Option<ExtractionRoute>,
    bytes_downloaded: u64,
}

/// Individual pipeline worker
#[derive(Debug, Clone)]
pub struct IngestWorker {
    /// Unique worker identifier
    id: u32,
    config: Arc<WorkerConfig>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    /// Server whose bucket the archives come from
    server: Server,
}

impl IngestWorker {
    /// Create a new worker
    pub fn new(
        id: u32,
        config: Arc<WorkerConfig>,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
        server: Server,
    ) -> Self {
        Self {
            id,
            config,
            store,
            catalog,
            server,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Run the whole pipeline for one archive
    ///
    /// Cleanup runs after every attempt, successful or not.
    pub async fn process(&self, entry: &RemoteArchiveEntry) -> FileReport {
        let started = Instant::now();
        let paths = ScratchPaths::for_entry(&self.config.output_dir, entry);
        let mut progress = Progress::default();

        let outcome = match self.ingest(entry, &paths, &mut progress).await {
            Ok(registration) => {
                let duplicate = registration.is_duplicate();
                if duplicate {
                    info!("{} was already registered, counting as processed", entry.key);
                } else {
                    info!("Registered {}", entry.key);
                }
                ProcessingOutcome::success(&entry.key, duplicate)
            }
            Err(e) => {
                warn!(
                    "Worker {} failed {} during {}: {}",
                    self.id,
                    entry.key,
                    progress
                        .stage
                        .map(|stage| stage.to_string())
                        .unwrap_or_else(|| "setup".to_string()),
                    e
                );
                ProcessingOutcome::failure(&entry.key, &e)
            }
        };

        let strategy = progress.route.map(|route| route.strategy());
        cleanup(&paths, self.config.keep, strategy).await;

        FileReport {
            worker_id: self.id,
            outcome,
            stage: progress.stage,
            route: progress.route,
            bytes_downloaded: progress.bytes_downloaded,
            elapsed: started.elapsed(),
        }
    }

    /// Failure report for an archive whose pipeline panicked
    pub async fn recover_from_panic(&self, entry: &RemoteArchiveEntry, message: &str) -> FileReport {
        error!("Worker {} panicked on {}: {}", self.id, entry.key, message);
        let paths = ScratchPaths::for_entry(&self.config.output_dir, entry);
        cleanup(&paths, self.config.keep, None).await;

        FileReport {
            worker_id: self.id,
            outcome: ProcessingOutcome::failure_with(
                &entry.key,
                FailureKind::Internal,
                format!("pipeline panicked: {message}"),
            ),
            stage: None,
            route: None,
            bytes_downloaded: 0,
            elapsed: Default::default(),
        }
    }

    async fn ingest(
        &self,
        entry: &RemoteArchiveEntry,
        paths: &ScratchPaths,
        progress: &mut Progress,
    ) -> Result<Registration> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let xml_path = self.obtain_article(entry, paths, progress).await?;

        progress.stage = Some(WorkerStage::Parsing);
        let metadata = jats::extract_metadata_from_file(&xml_path).await?;
        debug!(
            "Worker {} parsed {}: doi {} v{}",
            self.id, entry.key, metadata.doi, metadata.version_number
        );

        progress.stage = Some(WorkerStage::Registering);
        let payload = RegistrationPayload::new(metadata, entry, self.server);
        let registration = self.catalog.register(&payload).await?;

        progress.stage = Some(WorkerStage::CleaningUp);
        Ok(registration)
    }

    /// Put the article XML on disk, by ranged reads or by download
    async fn obtain_article(
        &self,
        entry: &RemoteArchiveEntry,
        paths: &ScratchPaths,
        progress: &mut Progress,
    ) -> Result<PathBuf> {
        if self.config.uses_ranged_reads(entry.size_bytes) {
            progress.stage = Some(WorkerStage::Extracting);
            progress.route = Some(ExtractionRoute::Ranged);
            match self.extract_ranged(entry, paths).await {
                Ok(path) => return Ok(path),
                Err(e) if falls_back_to_download(&e) => {
                    warn!("Ranged read of {} failed ({}), downloading instead", entry.key, e);
                }
                Err(e) => return Err(e),
            }
        }

        progress.stage = Some(WorkerStage::Downloading);
        progress.bytes_downloaded = self.download(entry, paths).await?;

        let strategy = ExtractionStrategy::choose(
            entry.size_bytes,
            self.config.full_extract,
            self.config.full_extract_threshold,
        );
        progress.stage = Some(WorkerStage::Extracting);
        progress.route = Some(ExtractionRoute::Local(strategy));
        debug!("Worker {} extracting {} ({})", self.id, entry.key, strategy);

        Ok(archive::extract_article(&paths.archive, &paths.scratch_dir, strategy).await?)
    }

    /// Read the article straight from the store
    ///
    /// Offsets are taken from the end of the object, so the size comes from a
    /// fresh head request rather than the listing.
    async fn extract_ranged(&self, entry: &RemoteArchiveEntry, paths: &ScratchPaths) -> Result<PathBuf> {
        let head = self.store.head(self.server, &entry.key).await?;
        if head.size != entry.size_bytes {
            warn!(
                "{} is {} bytes now but was listed at {}",
                entry.key, head.size, entry.size_bytes
            );
        }

        let archive = RangedArchive::open(
            Arc::clone(&self.store),
            self.server,
            &entry.key,
            head.size,
            self.config.tail_initial_bytes,
            self.config.tail_max_attempts,
        )
        .await?;
        archive.extract_article(&paths.scratch_dir).await
    }

    /// Download to the `.tmp` name, then move into place
    async fn download(&self, entry: &RemoteArchiveEntry, paths: &ScratchPaths) -> Result<u64> {
        let bytes = self
            .store
            .download_to(self.server, &entry.key, &paths.temp)
            .await?;
        tokio::fs::rename(&paths.temp, &paths.archive).await?;
        debug!("Worker {} downloaded {} ({} bytes)", self.id, entry.key, bytes);
        Ok(bytes)
    }
}

fn falls_back_to_download(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Extraction(ExtractionError::RangedReadExhausted { .. }) | AppError::Transport(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::archive::test_support::{build_archive, meca};
    use crate::app::catalog::MemoryCatalog;
    use crate::app::store::MemoryStore;
    use crate::app::worker::config::WorkerConfigBuilder;

    const KEY: &str = "Current_Content/January_2024/abc-1.meca";
    const DOI: &str = "10.1101/2024.01.05.000001";

    fn entry(size: u64) -> RemoteArchiveEntry {
        RemoteArchiveEntry {
            key: KEY.to_string(),
            size_bytes: size,
            last_modified: None,
            batch_label: "January_2024".to_string(),
        }
    }

    fn setup(bytes: Vec<u8>) -> (Arc<MemoryStore>, Arc<MemoryCatalog>, RemoteArchiveEntry) {
        let store = Arc::new(MemoryStore::new());
        let size = bytes.len() as u64;
        store.insert(Server::Biorxiv, KEY, bytes);
        (store, Arc::new(MemoryCatalog::new()), entry(size))
    }

    fn worker(config: WorkerConfig, store: &Arc<MemoryStore>, catalog: &Arc<MemoryCatalog>) -> IngestWorker {
        IngestWorker::new(
            0,
            Arc::new(config),
            store.clone(),
            catalog.clone(),
            Server::Biorxiv,
        )
    }

    #[tokio::test]
    async fn test_process_registers_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (store, catalog, entry) = setup(meca(DOI));
        let config = WorkerConfigBuilder::new().output_dir(dir.path()).build().unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert!(report.outcome.succeeded, "{:?}", report.outcome.error);
        assert!(!report.outcome.duplicate);
        assert_eq!(report.route, Some(ExtractionRoute::Local(ExtractionStrategy::Selective)));
        assert_eq!(catalog.registrations(), 1);
        let record = &catalog.records()[0];
        assert_eq!(record.doi, DOI);
        assert_eq!(record.s3_key.as_deref(), Some(KEY));
        assert_eq!(record.batch.as_deref(), Some("January_2024"));

        let paths = ScratchPaths::for_entry(dir.path(), &entry);
        assert!(!paths.archive.exists());
        assert!(!paths.scratch_dir.exists());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let (store, catalog, entry) = setup(meca(DOI));
        catalog.seed(DOI, 1, "January_2024", KEY);
        let config = WorkerConfigBuilder::new().output_dir(dir.path()).build().unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert!(report.outcome.succeeded);
        assert!(report.outcome.duplicate);
        assert_eq!(catalog.conflicts(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_archive_fails_in_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let (store, catalog, entry) = setup(b"this is not a zip file".to_vec());
        let config = WorkerConfigBuilder::new().output_dir(dir.path()).build().unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert!(!report.outcome.succeeded);
        let error = report.outcome.error.unwrap();
        assert_eq!(error.kind, FailureKind::Extraction);
        assert_eq!(report.stage, Some(WorkerStage::Extracting));
        assert_eq!(catalog.registrations(), 0);
        assert!(!ScratchPaths::for_entry(dir.path(), &entry).archive.exists());
    }

    #[tokio::test]
    async fn test_missing_doi_fails_in_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = crate::app::archive::test_support::manifest("article.xml");
        let bytes = build_archive(&[
            ("manifest.xml", manifest.as_bytes()),
            ("article.xml", b"<article><front/></article>"),
        ]);
        let (store, catalog, entry) = setup(bytes);
        let config = WorkerConfigBuilder::new().output_dir(dir.path()).build().unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert_eq!(report.stage, Some(WorkerStage::Parsing));
        assert_eq!(report.outcome.error.unwrap().kind, FailureKind::Metadata);
    }

    #[tokio::test]
    async fn test_ranged_reads_skip_download() {
        let dir = tempfile::tempdir().unwrap();
        let (store, catalog, entry) = setup(meca(DOI));
        let config = WorkerConfigBuilder::new()
            .output_dir(dir.path())
            .ranged_reads(true)
            .build()
            .unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert!(report.outcome.succeeded, "{:?}", report.outcome.error);
        assert_eq!(report.route, Some(ExtractionRoute::Ranged));
        assert_eq!(report.bytes_downloaded, 0);
        assert_eq!(store.downloads(), 0);
        assert!(store.range_reads() >= 1);
    }

    #[tokio::test]
    async fn test_ranged_reads_use_current_object_size() {
        let dir = tempfile::tempdir().unwrap();
        let (store, catalog, mut entry) = setup(meca(DOI));
        // Listing taken before the object was replaced with a smaller one
        entry.size_bytes += 4096;
        let config = WorkerConfigBuilder::new()
            .output_dir(dir.path())
            .ranged_reads(true)
            .build()
            .unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert!(report.outcome.succeeded, "{:?}", report.outcome.error);
        assert_eq!(report.route, Some(ExtractionRoute::Ranged));
        assert_eq!(store.heads(), 1);
        assert_eq!(store.downloads(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_ranged_reads_fall_back_to_download() {
        let dir = tempfile::tempdir().unwrap();
        let (store, catalog, entry) = setup(meca(DOI));
        let config = WorkerConfigBuilder::new()
            .output_dir(dir.path())
            .ranged_reads(true)
            .tail(8, 1)
            .build()
            .unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert!(report.outcome.succeeded, "{:?}", report.outcome.error);
        assert_eq!(
            report.route,
            Some(ExtractionRoute::Local(ExtractionStrategy::Selective))
        );
        assert_eq!(store.downloads(), 1);
    }

    #[tokio::test]
    async fn test_retention_keeps_full_tree() {
        let dir = tempfile::tempdir().unwrap();
        let (store, catalog, entry) = setup(meca(DOI));
        let config = WorkerConfigBuilder::new()
            .output_dir(dir.path())
            .keep(true)
            .full_extract(true)
            .build()
            .unwrap();

        let report = worker(config, &store, &catalog).process(&entry).await;

        assert!(report.outcome.succeeded);
        let paths = ScratchPaths::for_entry(dir.path(), &entry);
        assert!(paths.archive.exists());
        assert!(paths.scratch_dir.exists());
        assert!(!paths.temp.exists());
    }

    #[tokio::test]
    async fn test_missing_object_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let config = WorkerConfigBuilder::new().output_dir(dir.path()).build().unwrap();

        let report = worker(config, &store, &catalog).process(&entry(10)).await;

        assert_eq!(report.stage, Some(WorkerStage::Downloading));
        assert_eq!(report.outcome.error.unwrap().kind, FailureKind::Transport);
    }
}
