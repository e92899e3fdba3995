//! meca_ingest Library
//!
//! Ingests bioRxiv and medRxiv MECA preprint archives from requester-pays S3
//! buckets into a metadata catalog: period resolution, archive listing,
//! catalog reconciliation, bounded-concurrency extraction and registration.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
