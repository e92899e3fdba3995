//! Core application logic for meca_ingest
//!
//! This module contains the ingestion pipeline: period resolution, archive
//! listing, catalog reconciliation, manuscript extraction, metadata parsing
//! and the worker pool that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use meca_ingest::app::{
//!     CatalogClient, ClientConfig, Coordinator, CoordinatorConfig, PeriodRequest, S3Store,
//!     Server, StoreConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(S3Store::new(StoreConfig::default()).await);
//! let catalog = Arc::new(CatalogClient::new(&ClientConfig::default())?);
//!
//! let coordinator = Coordinator::new(CoordinatorConfig::default(), store, catalog);
//! let periods = [PeriodRequest::Month { year: 2024, month: 1 }];
//! let summary = coordinator.run(&periods, Server::Biorxiv).await?;
//! println!("{}", summary.totals);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod catalog;
pub mod cleanup;
pub mod coordinator;
pub mod folder;
pub mod jats;
pub mod lister;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod worker;

// Re-export main public API
pub use archive::{extract_article, ExtractionStrategy, RangedArchive};
pub use catalog::{Catalog, CatalogClient, ClientConfig, MemoryCatalog, Registration, WorkRecord};
pub use cleanup::{cleanup, ScratchPaths};
pub use coordinator::{
    Coordinator, CoordinatorConfig, IngestStats, PeriodStatus, PeriodSummary, ProgressEvent,
    RunSummary,
};
pub use folder::{
    expand_batch_selector, expand_month_selector, normalize_batch, resolve_folder,
    resolve_period, PeriodRequest,
};
pub use jats::extract_metadata;
pub use lister::list_archives;
pub use models::{
    ContentEra, ExtractedMetadata, FolderReference, ProcessingOutcome, RegistrationPayload,
    RemoteArchiveEntry, Server,
};
pub use reconcile::{reconcile, ReconcileOptions, Reconciliation};
pub use store::{MemoryStore, ObjectStore, S3Store, StoreConfig};
pub use worker::{WorkerConfig, WorkerPool};
