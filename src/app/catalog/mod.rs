//! Catalog service access
//!
//! The catalog is the system of record for registered manuscript versions.
//! The pipeline reads it to reconcile listings and writes one registration per
//! processed archive, always through the [`Catalog`] trait.
//!
//! - `config`: HTTP client configuration and building
//! - `http`: rate limiting and retry around every request
//! - `client`: the REST implementation
//! - `memory`: an in-memory implementation enforcing `(doi, version)` uniqueness

use async_trait::async_trait;

use crate::app::models::RegistrationPayload;
use crate::errors::TransportResult;

pub mod client;
pub mod config;
pub mod http;
pub mod memory;
pub mod types;

pub use client::CatalogClient;
pub use config::ClientConfig;
pub use memory::MemoryCatalog;
pub use types::{CatalogFile, CatalogPage, Pagination, Registration, WorkRecord};

/// Operations the pipeline needs from the catalog service
#[async_trait]
pub trait Catalog: Send + Sync + std::fmt::Debug {
    /// One page of the files registered for a period label
    async fn list_registered(&self, period: &str, limit: u32, offset: u64)
        -> TransportResult<CatalogPage>;

    /// Registered record for an object key, `None` when unknown
    async fn lookup_by_key(&self, s3_key: &str) -> TransportResult<Option<WorkRecord>>;

    /// Register one manuscript version
    async fn register(&self, payload: &RegistrationPayload) -> TransportResult<Registration>;

    /// Registered record for a DOI, `None` when unknown
    async fn fetch_work(&self, doi: &str) -> TransportResult<Option<WorkRecord>>;
}
