//! Object store access
//!
//! The pipeline talks to the archive bucket only through the [`ObjectStore`]
//! trait: paginated listing, head, ranged reads and streamed downloads. The
//! production implementation is [`S3Store`]; [`MemoryStore`] backs tests and
//! offline runs.
//!
//! Bucket selection and the requester-pays flag live in [`StoreConfig`], built
//! once at startup and handed to the store; nothing about them is global.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::models::Server;
use crate::constants::store;
use crate::errors::TransportResult;

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// Object-store client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// AWS region of the buckets
    pub region: String,
    /// Custom endpoint for S3-compatible services
    pub endpoint_url: Option<String>,
    /// Use path-style addressing (needed by most S3-compatible services)
    pub force_path_style: bool,
    /// Attach `x-amz-request-payer: requester` to every request
    pub requester_pays: bool,
    /// Bucket holding bioRxiv archives
    pub biorxiv_bucket: String,
    /// Bucket holding medRxiv archives
    pub medrxiv_bucket: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            region: store::DEFAULT_REGION.to_string(),
            endpoint_url: None,
            force_path_style: false,
            requester_pays: true,
            biorxiv_bucket: store::BIORXIV_BUCKET.to_string(),
            medrxiv_bucket: store::MEDRXIV_BUCKET.to_string(),
        }
    }
}

impl StoreConfig {
    /// Bucket that holds the archives of `server`
    pub fn bucket_for(&self, server: Server) -> &str {
        match server {
            Server::Biorxiv => &self.biorxiv_bucket,
            Server::Medrxiv => &self.medrxiv_bucket,
        }
    }
}

/// One listed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Continuation token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Object metadata from a head request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Inclusive byte range of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range of `len` bytes starting at `start`; `len` must be non-zero
    pub fn new(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start + len.max(1) - 1,
        }
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// HTTP `Range` header value
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// S3-compatible object store operations used by the pipeline
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// List one page of objects under `prefix`
    async fn list_page(
        &self,
        server: Server,
        prefix: &str,
        continuation: Option<String>,
        max_keys: i32,
    ) -> TransportResult<ListPage>;

    /// Fetch object metadata
    async fn head(&self, server: Server, key: &str) -> TransportResult<ObjectHead>;

    /// Read an inclusive byte range of an object
    async fn get_range(&self, server: Server, key: &str, range: ByteRange)
        -> TransportResult<Vec<u8>>;

    /// Stream a whole object into `destination`, returning the bytes written
    async fn download_to(&self, server: Server, key: &str, destination: &Path)
        -> TransportResult<u64>;
}
