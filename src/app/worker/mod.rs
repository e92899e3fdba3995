//! Pipeline workers for concurrent archive processing
//!
//! Each worker pulls archives from a shared queue and takes every one of them
//! through download → extract → parse → register → cleanup. Failures and
//! panics stay with the archive they happened on.
//!
//! # Module Organization
//!
//! - [`config`] - Worker configuration with validation
//! - [`types`] - Reports, stages and pool state
//! - [`core`] - The per-archive pipeline
//! - [`pool`] - Worker pool over a shared queue
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use meca_ingest::app::catalog::MemoryCatalog;
//! use meca_ingest::app::models::Server;
//! use meca_ingest::app::store::MemoryStore;
//! use meca_ingest::app::worker::{WorkerConfigBuilder, WorkerPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkerConfigBuilder::new().worker_count(4).build()?;
//! let mut pool = WorkerPool::new(
//!     config,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryCatalog::new()),
//!     Server::Biorxiv,
//! );
//!
//! let (report_tx, mut report_rx) = tokio::sync::mpsc::channel(100);
//! pool.start(Vec::new(), report_tx)?;
//! while let Some(report) = report_rx.recv().await {
//!     println!("{}: {}", report.outcome.key, report.outcome.succeeded);
//! }
//! pool.join().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod pool;
pub mod types;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use self::core::IngestWorker;
pub use pool::WorkerPool;
pub use types::{ExtractionRoute, FileReport, PoolState, WorkerStage};
