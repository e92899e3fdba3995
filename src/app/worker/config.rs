//! Worker configuration management
//!
//! Settings shared by every pipeline worker: concurrency, where scratch files
//! go, retention and the extraction strategy knobs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{archive, files, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for pipeline workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers to spawn
    pub worker_count: usize,
    /// Directory holding downloaded archives and scratch directories
    pub output_dir: PathBuf,
    /// Keep archives (and full extraction trees) after processing
    pub keep: bool,
    /// Always decompress the whole archive
    pub full_extract: bool,
    /// Size above which an archive is extracted fully
    pub full_extract_threshold: u64,
    /// Read archives with ranged GETs instead of downloading them
    pub ranged_reads: bool,
    /// Initial tail fetched by ranged reads
    pub tail_initial_bytes: u64,
    /// Doubling budget of ranged reads
    pub tail_max_attempts: u32,
    /// Channel buffer size for worker reports
    pub report_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            output_dir: PathBuf::from(files::DEFAULT_OUTPUT_DIR),
            keep: false,
            full_extract: false,
            full_extract_threshold: archive::FULL_EXTRACT_THRESHOLD,
            ranged_reads: false,
            tail_initial_bytes: archive::TAIL_INITIAL_BYTES,
            tail_max_attempts: archive::TAIL_MAX_ATTEMPTS,
            report_buffer_size: workers::CHANNEL_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 || self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".to_string(),
                value: self.worker_count.to_string(),
                reason: format!("Must be between 1 and {}", workers::MAX_WORKER_COUNT),
            });
        }

        if self.ranged_reads && (self.tail_initial_bytes == 0 || self.tail_max_attempts == 0) {
            return Err(ConfigError::InvalidValue {
                field: "tail_initial_bytes".to_string(),
                value: format!("{}/{}", self.tail_initial_bytes, self.tail_max_attempts),
                reason: "Ranged reads need a non-zero tail and attempt budget".to_string(),
            });
        }

        if self.report_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "report_buffer_size".to_string(),
                value: "0".to_string(),
                reason: "Channel buffer must hold at least one report".to_string(),
            });
        }

        Ok(())
    }

    /// Whether ranged reads apply to an archive of `size_bytes`
    ///
    /// Retention needs the archive on disk and full extraction needs every
    /// entry, so both disable ranged reads.
    pub fn uses_ranged_reads(&self, size_bytes: u64) -> bool {
        self.ranged_reads
            && !self.keep
            && !self.full_extract
            && size_bytes <= self.full_extract_threshold
    }
}

/// Builder for WorkerConfig
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: WorkerConfig::default(),
        }
    }

    /// Set the number of workers
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Set the scratch output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Keep archives after processing
    pub fn keep(mut self, keep: bool) -> Self {
        self.config.keep = keep;
        self
    }

    /// Force full extraction
    pub fn full_extract(mut self, full: bool) -> Self {
        self.config.full_extract = full;
        self
    }

    /// Set the full extraction size threshold
    pub fn full_extract_threshold(mut self, bytes: u64) -> Self {
        self.config.full_extract_threshold = bytes;
        self
    }

    /// Enable ranged reads
    pub fn ranged_reads(mut self, enabled: bool) -> Self {
        self.config.ranged_reads = enabled;
        self
    }

    /// Set the ranged-read tail and attempt budget
    pub fn tail(mut self, initial_bytes: u64, max_attempts: u32) -> Self {
        self.config.tail_initial_bytes = initial_bytes;
        self.config.tail_max_attempts = max_attempts;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConfigResult<WorkerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_count, 1);
        assert!(!config.ranged_reads);
    }

    #[test]
    fn test_invalid_worker_count() {
        assert!(WorkerConfigBuilder::new().worker_count(0).build().is_err());
        assert!(WorkerConfigBuilder::new()
            .worker_count(workers::MAX_WORKER_COUNT + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_ranged_reads_gating() {
        let config = WorkerConfigBuilder::new()
            .ranged_reads(true)
            .full_extract_threshold(1_000)
            .build()
            .unwrap();
        assert!(config.uses_ranged_reads(500));
        assert!(!config.uses_ranged_reads(2_000));

        let kept = WorkerConfig {
            keep: true,
            ..config.clone()
        };
        assert!(!kept.uses_ranged_reads(500));

        let full = WorkerConfig {
            full_extract: true,
            ..config
        };
        assert!(!full.uses_ranged_reads(500));
    }

    #[test]
    fn test_ranged_reads_need_budget() {
        let result = WorkerConfigBuilder::new().ranged_reads(true).tail(0, 3).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
