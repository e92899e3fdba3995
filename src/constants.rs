//! Application constants for meca_ingest
//!
//! Constants are grouped by functional domain so each component pulls in only
//! what it needs.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// API key for the catalog service
    pub const CATALOG_API_KEY: &str = "CATALOG_API_KEY";

    /// Override for the catalog base URL
    pub const CATALOG_URL: &str = "CATALOG_URL";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all catalog requests
    pub const USER_AGENT: &str = concat!("meca_ingest/", env!("CARGO_PKG_VERSION"));

    /// Default catalog request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for catalog requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;

    /// Maximum retry attempts for failed catalog requests
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Jitter factor for randomizing delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;
}

/// Catalog service endpoints and paging
pub mod catalog {
    /// Default catalog base URL
    pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/v1";

    /// Registered items for a period
    pub const BUCKET_LIST_PATH: &str = "bucket/list";

    /// Work registration and lookup
    pub const WORKS_PATH: &str = "works";

    /// Page size for the period listing
    pub const DEFAULT_PAGE_SIZE: u32 = 500;

    /// Upper bound on pages fetched for one period
    pub const MAX_PAGES: u32 = 10_000;
}

/// Object store constants
pub mod store {
    /// Default AWS region of the MECA buckets
    pub const DEFAULT_REGION: &str = "us-east-1";

    /// Default bucket for bioRxiv archives
    pub const BIORXIV_BUCKET: &str = "biorxiv-src-monthly";

    /// Default bucket for medRxiv archives
    pub const MEDRXIV_BUCKET: &str = "medrxiv-src-monthly";

    /// Largest page the list API returns
    pub const LIST_PAGE_SIZE: i32 = 1000;

    /// Archive extension
    pub const MECA_EXTENSION: &str = ".meca";
}

/// Folder layout and period resolution
pub mod folder {
    /// Prefix root for content at or after the cutoff
    pub const CURRENT_CONTENT_ROOT: &str = "Current_Content";

    /// Prefix root for batch-organised back content
    pub const BACK_CONTENT_ROOT: &str = "Back_Content";

    /// Year of the first current-content month
    pub const CUTOFF_YEAR: i32 = 2018;

    /// Month of the first current-content month
    pub const CUTOFF_MONTH: u32 = 12;

    /// Minimum digits of a normalised batch number
    pub const BATCH_PAD_WIDTH: usize = 2;
}

/// Archive extraction constants
pub mod archive {
    /// Above this size the archive is extracted fully instead of selectively
    pub const FULL_EXTRACT_THRESHOLD: u64 = 1_900_000_000;

    /// Manifest file name inside a MECA archive
    pub const MANIFEST_NAME: &str = "manifest.xml";

    /// Initial tail fetched when opening an archive with ranged reads
    pub const TAIL_INITIAL_BYTES: u64 = 64 * 1024;

    /// Maximum doubling attempts for ranged reads
    pub const TAIL_MAX_ATTEMPTS: u32 = 8;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for partial downloads
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Suffix of the per-archive scratch directory
    pub const SCRATCH_DIR_SUFFIX: &str = "_extract";

    /// Default output directory for scratch files
    pub const DEFAULT_OUTPUT_DIR: &str = "./scratch";
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of concurrent pipeline workers
    pub const DEFAULT_WORKER_COUNT: usize = 1;

    /// Maximum concurrent workers accepted from the CLI
    pub const MAX_WORKER_COUNT: usize = 64;

    /// Channel buffer size for worker results
    pub const CHANNEL_BUFFER_SIZE: usize = 100;
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use env::CATALOG_API_KEY as ENV_CATALOG_API_KEY;
pub use http::USER_AGENT;
pub use store::MECA_EXTENSION;
pub use workers::DEFAULT_WORKER_COUNT;
