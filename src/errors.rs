//! Error types for meca_ingest
//!
//! Errors are split by the stage that produces them so the orchestrator can
//! classify every per-file failure without inspecting message text. Setup-time
//! problems surface as [`ConfigError`] and abort the run; everything else is
//! attached to the outcome of a single archive.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Setup-time configuration errors (fatal before any pipeline work starts)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Month selector is not `YYYY-MM`, `Name_YYYY` or `YYYY-*`
    #[error("Invalid month format: '{input}'. Expected YYYY-MM, Month_YYYY or YYYY-*")]
    InvalidMonth { input: String },

    /// Batch selector is not a positive batch number in a recognised spelling
    #[error("Invalid batch format: '{input}'. Expected a positive number, N-M range or Batch_NN")]
    InvalidBatch { input: String },

    /// Both or neither of month/batch were supplied
    #[error("Exactly one of --month or --batch must be given")]
    AmbiguousSelector,

    /// Month predates the current-content cutoff and has no batch mapping
    #[error(
        "Month {month} predates current content (December 2018); back content has no month mapping, pass --batch explicitly"
    )]
    BackContentMonth { month: String },

    /// Selector expanded to no periods at all
    #[error("Selector '{input}' does not match any ingestible period")]
    EmptySelection { input: String },

    /// Unknown server name
    #[error("Unknown server '{input}'. Expected biorxiv or medrxiv")]
    UnknownServer { input: String },

    /// Human-readable size could not be parsed
    #[error("Invalid size '{input}'. Expected bytes or a value such as 100MB or 1.5GB")]
    InvalidSize { input: String },

    /// Missing required configuration field or credential
    #[error("Missing required configuration: {field}")]
    MissingField { field: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration file format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Object store and catalog communication errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request error from the catalog client
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Object store operation failed
    #[error("Object store {operation} failed for '{target}': {message}")]
    Store {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// Object does not exist in the store
    #[error("Object not found: {key}")]
    ObjectNotFound { key: String },

    /// Catalog answered with an unexpected status
    #[error("Catalog returned HTTP {status} for {endpoint}")]
    UnexpectedStatus { status: u16, endpoint: String },

    /// Catalog answered 429 until the retry budget ran out
    #[error("Catalog rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Catalog kept failing until the retry budget ran out
    #[error("Maximum retry attempts ({max_retries}) exceeded for {endpoint}")]
    MaxRetriesExceeded { max_retries: u32, endpoint: String },

    /// Response body did not match the documented contract
    #[error("Malformed catalog response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// Invalid URL composed from configuration
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Local I/O while streaming a download
    #[error("I/O error while transferring '{key}'")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Archive extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The zip container could not be read
    #[error("Corrupt or unreadable archive {archive}: {reason}")]
    CorruptArchive { archive: String, reason: String },

    /// No manifest entry inside the archive
    #[error("Archive {archive} contains no manifest.xml")]
    ManifestMissing { archive: String },

    /// Manifest lists no article XML instance
    #[error("Manifest of {archive} lists no article XML instance")]
    ArticleNotListed { archive: String },

    /// Manifest references an entry that is not in the zip
    #[error("Article entry '{entry}' listed in manifest is absent from {archive}")]
    EntryMissing { archive: String, entry: String },

    /// Entry path would escape the scratch directory
    #[error("Refusing to extract unsafe entry path '{entry}'")]
    UnsafePath { entry: String },

    /// Post-extraction verification failed
    #[error("Extracted article file not found at {path}")]
    TargetMissing { path: PathBuf },

    /// Ranged reads could not fault in the requested bytes
    #[error("Ranged read of {key} gave up after {attempts} attempts")]
    RangedReadExhausted { key: String, attempts: u32 },

    /// I/O error while extracting
    #[error("I/O error during extraction")]
    Io(#[from] std::io::Error),
}

/// Manuscript metadata errors
#[derive(Error, Debug)]
pub enum MetadataError {
    /// XML could not be parsed even after preprocessing
    #[error("Malformed XML at byte {position}: {reason}")]
    MalformedXml { position: usize, reason: String },

    /// No DOI article-id in the document
    #[error("No DOI found in manuscript XML")]
    MissingDoi,

    /// Neither received nor accepted date anywhere in the document
    #[error("No received or accepted date found in manuscript XML")]
    MissingDates,

    /// I/O error reading the manuscript file
    #[error("I/O error reading manuscript XML")]
    Io(#[from] std::io::Error),
}

/// Classification attached to failed processing outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Configuration,
    Transport,
    Extraction,
    Metadata,
    Io,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Transport => "transport",
            FailureKind::Extraction => "extraction",
            FailureKind::Metadata => "metadata",
            FailureKind::Io => "io",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Extraction error
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Metadata error
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Run aborted by a process-level interrupt
    #[error("Run interrupted; scratch files of in-flight archives were left on disk")]
    Interrupted,

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is transient and a later run may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transport(TransportError::Http(_))
            | AppError::Transport(TransportError::Store { .. })
            | AppError::Transport(TransportError::RateLimitExceeded)
            | AppError::Transport(TransportError::MaxRetriesExceeded { .. })
            | AppError::Transport(TransportError::Io { .. }) => true,

            AppError::Transport(TransportError::UnexpectedStatus { status, .. }) => *status >= 500,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Transport(_) => "transport",
            AppError::Extraction(_) => "extraction",
            AppError::Metadata(_) => "metadata",
            AppError::Io(_) => "io",
            AppError::Interrupted => "interrupted",
            AppError::Generic { .. } => "generic",
        }
    }

    /// Failure kind recorded on a processing outcome
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::Config(_) => FailureKind::Configuration,
            AppError::Transport(_) => FailureKind::Transport,
            AppError::Extraction(_) => FailureKind::Extraction,
            AppError::Metadata(_) => FailureKind::Metadata,
            AppError::Io(_) => FailureKind::Io,
            AppError::Interrupted | AppError::Generic { .. } => FailureKind::Internal,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Transport result type alias
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Extraction result type alias
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// Metadata result type alias
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
