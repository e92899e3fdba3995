//! Configuration management for meca_ingest
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file (`--config` or the first file found in the standard locations), the
//! environment (`CATALOG_API_KEY`, `CATALOG_URL`, also read from `.env`) and
//! finally the CLI flags applied by the command handlers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::catalog::ClientConfig;
use crate::app::coordinator::CoordinatorConfig;
use crate::app::reconcile::ReconcileOptions;
use crate::app::store::StoreConfig;
use crate::app::worker::WorkerConfig;
use crate::constants::{archive, catalog, env, files, http, limits, logging, store, workers};
use crate::errors::{AppError, ConfigError, Result};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Object store settings
    pub store: StoreConfig,
    /// Catalog client settings
    pub catalog: CatalogConfigToml,
    /// Pipeline settings
    pub pipeline: PipelineConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly catalog client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfigToml {
    /// Catalog base URL
    pub base_url: String,
    /// API key; `CATALOG_API_KEY` takes precedence
    pub api_key: Option<String>,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retries after the first attempt
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Page size of the period listing
    pub page_size: u32,
    /// Upper bound on listing pages per period
    pub max_pages: u32,
}

impl Default for CatalogConfigToml {
    fn default() -> Self {
        Self {
            base_url: catalog::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            page_size: catalog::DEFAULT_PAGE_SIZE,
            max_pages: catalog::MAX_PAGES,
        }
    }
}

/// TOML-friendly pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfigToml {
    /// Concurrent workers
    pub concurrency: usize,
    /// Scratch directory for archives and extraction
    pub output_dir: PathBuf,
    /// Keep archives after processing
    pub keep: bool,
    /// Always decompress whole archives
    pub full_extract: bool,
    /// Size in bytes above which archives are extracted fully
    pub full_extract_threshold: u64,
    /// Read archives with ranged GETs instead of downloading them
    pub ranged_reads: bool,
    /// Initial tail in bytes for ranged reads
    pub tail_initial_bytes: u64,
    /// Doubling budget for ranged reads
    pub tail_max_attempts: u32,
    /// Archive extension to list
    pub extension: String,
}

impl Default for PipelineConfigToml {
    fn default() -> Self {
        Self {
            concurrency: workers::DEFAULT_WORKER_COUNT,
            output_dir: PathBuf::from(files::DEFAULT_OUTPUT_DIR),
            keep: false,
            full_extract: false,
            full_extract_threshold: archive::FULL_EXTRACT_THRESHOLD,
            ranged_reads: false,
            tail_initial_bytes: archive::TAIL_INITIAL_BYTES,
            tail_max_attempts: archive::TAIL_MAX_ATTEMPTS,
            extension: store::MECA_EXTENSION.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no CLI flag or `RUST_LOG` is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the config file, then the environment
    ///
    /// # Errors
    ///
    /// `ConfigError::NotFound` when an explicitly given file does not exist;
    /// `ConfigError::InvalidFormat` when the file is not valid TOML.
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path }.into());
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(env::CATALOG_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.catalog.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = lookup(env::CATALOG_URL).filter(|v| !v.trim().is_empty()) {
            self.catalog.base_url = url.trim().to_string();
        }
    }

    /// Write the commented default configuration file
    ///
    /// Refuses to overwrite an existing file unless `force` is set. Returns
    /// the path written.
    pub async fn initialize(path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
        let config_path = match path {
            Some(path) => path,
            None => Self::get_default_config_path()?,
        };

        if config_path.exists() && !force {
            return Err(ConfigError::InvalidValue {
                field: "path".to_string(),
                value: config_path.display().to_string(),
                reason: "Configuration file already exists; use --force to overwrite".to_string(),
            }
            .into());
        }

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&config_path, Self::generate_default_config_content()).await?;

        info!("Wrote default configuration to {}", config_path.display());
        Ok(config_path)
    }

    /// Effective configuration as TOML, with the API key redacted
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.catalog.api_key.is_some() {
            shown.catalog.api_key = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| AppError::generic(format!("Failed to render configuration: {e}")))
    }

    /// Catalog client settings for runtime use
    pub fn client_config(&self) -> ClientConfig {
        self.catalog.to_runtime_config()
    }

    /// Coordinator settings for runtime use, before CLI overrides
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            worker: self.pipeline.to_runtime_config(),
            extension: self.pipeline.extension.clone(),
            reconcile: ReconcileOptions {
                page_size: self.catalog.page_size,
                max_pages: self.catalog.max_pages,
            },
            ..CoordinatorConfig::default()
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from("./meca_ingest.toml")];
        if let Ok(path) = Self::get_default_config_path() {
            search_paths.push(path);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        match &found {
            Some(path) => debug!("Found config file: {}", path.display()),
            None => debug!("No config file found in standard locations"),
        }
        found
    }

    /// Default config file path for the current user
    pub fn get_default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::MissingField {
            field: "user config directory".to_string(),
        })?;

        Ok(config_dir.join("meca_ingest").join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::from)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Default configuration content with comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# meca_ingest configuration
# Remove or change any setting; missing settings use the defaults shown here.

[store]
region = "{region}"
# endpoint_url = "http://localhost:9000"  # S3-compatible services
force_path_style = false
requester_pays = true
biorxiv_bucket = "{biorxiv}"
medrxiv_bucket = "{medrxiv}"

[catalog]
base_url = "{base_url}"
# api_key = "..."  # prefer the CATALOG_API_KEY environment variable
rate_limit_rps = {rps}
max_retries = {retries}
retry_base_delay = "{retry_delay}ms"
request_timeout = "{request_timeout}s"
connect_timeout = "{connect_timeout}s"
pool_max_per_host = {pool}
page_size = {page_size}
max_pages = {max_pages}

[pipeline]
concurrency = {concurrency}
output_dir = "{output_dir}"
keep = false
full_extract = false
full_extract_threshold = {threshold}
ranged_reads = false
tail_initial_bytes = {tail}
tail_max_attempts = {attempts}
extension = "{extension}"

[logging]
level = "{level}"  # error, warn, info, debug, trace
"#,
            region = store::DEFAULT_REGION,
            biorxiv = store::BIORXIV_BUCKET,
            medrxiv = store::MEDRXIV_BUCKET,
            base_url = catalog::DEFAULT_BASE_URL,
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            retries = limits::MAX_RETRIES,
            retry_delay = limits::RETRY_BASE_DELAY_MS,
            request_timeout = http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout = http::CONNECT_TIMEOUT.as_secs(),
            pool = http::POOL_MAX_PER_HOST,
            page_size = catalog::DEFAULT_PAGE_SIZE,
            max_pages = catalog::MAX_PAGES,
            concurrency = workers::DEFAULT_WORKER_COUNT,
            output_dir = files::DEFAULT_OUTPUT_DIR,
            threshold = archive::FULL_EXTRACT_THRESHOLD,
            tail = archive::TAIL_INITIAL_BYTES,
            attempts = archive::TAIL_MAX_ATTEMPTS,
            extension = store::MECA_EXTENSION,
            level = logging::DEFAULT_LOG_LEVEL,
        )
    }
}

impl CatalogConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            rate_limit_rps: self.rate_limit_rps,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            ..ClientConfig::default()
        }
    }
}

impl PipelineConfigToml {
    /// Convert to runtime WorkerConfig
    pub fn to_runtime_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_count: self.concurrency,
            output_dir: self.output_dir.clone(),
            keep: self.keep,
            full_extract: self.full_extract,
            full_extract_threshold: self.full_extract_threshold,
            ranged_reads: self.ranged_reads,
            tail_initial_bytes: self.tail_initial_bytes,
            tail_max_attempts: self.tail_max_attempts,
            ..WorkerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();

        assert_eq!(config.pipeline.concurrency, workers::DEFAULT_WORKER_COUNT);
        assert_eq!(config.catalog.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(config.logging.level, "info");
        assert!(config.store.requester_pays);
    }

    #[test]
    fn test_config_file_generation() {
        let content = AppConfig::generate_default_config_content();

        let parsed: AppConfig = toml::from_str(&content).unwrap();

        assert_eq!(parsed.pipeline.concurrency, workers::DEFAULT_WORKER_COUNT);
        assert_eq!(parsed.catalog.request_timeout, http::DEFAULT_TIMEOUT);
        assert_eq!(
            parsed.catalog.retry_base_delay,
            Duration::from_millis(limits::RETRY_BASE_DELAY_MS)
        );
        assert_eq!(parsed.store.biorxiv_bucket, store::BIORXIV_BUCKET);
        assert!(content.contains("[pipeline]"));
    }

    #[tokio::test]
    async fn test_config_loading_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let result = AppConfig::load(Some(config_path)).await;
        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_config_loading_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let test_config = r#"
[catalog]
base_url = "https://catalog.example.org/api/v1"
request_timeout = "45s"

page_size = 250
max_pages = 40

[pipeline]
concurrency = 5
ranged_reads = true

[logging]
level = "debug"
"#;
        tokio::fs::write(&config_path, test_config).await.unwrap();

        let config = AppConfig::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.pipeline.concurrency, 5);
        assert!(config.pipeline.ranged_reads);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.catalog.request_timeout, Duration::from_secs(45));
        // Unspecified values keep their defaults
        assert_eq!(config.catalog.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(config.pipeline.extension, ".meca");

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.worker.worker_count, 5);
        assert!(coordinator.worker.ranged_reads);
        // Catalog paging drives reconciliation
        assert_eq!(coordinator.reconcile.page_size, 250);
        assert_eq!(coordinator.reconcile.max_pages, 40);
        assert_eq!(config.client_config().request_timeout, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        tokio::fs::write(&config_path, "[pipeline\nconcurrency = ").await.unwrap();

        let result = AppConfig::load(Some(config_path)).await;
        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::InvalidFormat(_)))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|name| match name {
            "CATALOG_API_KEY" => Some(" secret ".to_string()),
            "CATALOG_URL" => Some("https://example.org/api".to_string()),
            _ => None,
        });

        assert_eq!(config.catalog.api_key.as_deref(), Some("secret"));
        assert_eq!(config.client_config().base_url, "https://example.org/api");

        let shown = config.to_display_toml().unwrap();
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("secret"));
    }

    #[tokio::test]
    async fn test_initialize_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let written = AppConfig::initialize(Some(path.clone()), false).await.unwrap();
        assert_eq!(written, path);
        assert!(AppConfig::initialize(Some(path.clone()), false).await.is_err());
        assert!(AppConfig::initialize(Some(path), true).await.is_ok());
    }
}
