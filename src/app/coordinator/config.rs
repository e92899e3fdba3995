//! Configuration structures for the ingestion coordinator

use serde::{Deserialize, Serialize};

use crate::app::reconcile::ReconcileOptions;
use crate::app::worker::WorkerConfig;
use crate::constants::store;
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Worker pool settings
    pub worker: WorkerConfig,
    /// Archive extension to list
    pub extension: String,
    /// Stop listing after this many archives per period
    pub limit: Option<usize>,
    /// Skip archives larger than this many bytes
    pub max_file_size: Option<u64>,
    /// Process every listed archive without consulting the catalog
    pub force: bool,
    /// List and reconcile only
    pub dry_run: bool,
    #[serde(skip)]
    pub reconcile: ReconcileOptions,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            extension: store::MECA_EXTENSION.to_string(),
            limit: None,
            max_file_size: None,
            force: false,
            dry_run: false,
            reconcile: ReconcileOptions::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Set the worker count
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker.worker_count = count;
        self
    }

    /// Set the per-period listing limit
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Set the maximum archive size
    pub fn with_max_file_size(mut self, bytes: Option<u64>) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Enable or disable reconciliation bypass
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.worker.validate()?;

        if self.extension.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "extension".to_string(),
                value: String::new(),
                reason: "Archive extension cannot be empty".to_string(),
            });
        }

        if self.reconcile.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "page_size".to_string(),
                value: "0".to_string(),
                reason: "Catalog page size must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Whether an archive of `size_bytes` is skipped for its size
    pub fn exceeds_max_size(&self, size_bytes: u64) -> bool {
        self.max_file_size.is_some_and(|max| size_bytes > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.extension, ".meca");
    }

    #[test]
    fn test_builder_pattern() {
        let config = CoordinatorConfig::default()
            .with_worker_count(5)
            .with_limit(Some(10))
            .with_max_file_size(Some(100))
            .with_force(true)
            .with_dry_run(true);

        assert_eq!(config.worker.worker_count, 5);
        assert_eq!(config.limit, Some(10));
        assert!(config.force);
        assert!(config.dry_run);
        assert!(config.exceeds_max_size(101));
        assert!(!config.exceeds_max_size(100));
    }

    #[test]
    fn test_invalid_worker_count_rejected() {
        assert!(CoordinatorConfig::default()
            .with_worker_count(0)
            .validate()
            .is_err());
    }
}
