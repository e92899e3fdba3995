//! Ingestion statistics and summaries
//!
//! Counts are folded by the coordinator alone, one report at a time, so the
//! totals do not depend on the order workers finish in.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::models::ProcessingOutcome;
use crate::app::worker::FileReport;

/// Aggregated counts for one period (or a whole run)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Archives listed under the prefix
    pub total_candidates: usize,
    /// Skipped for exceeding the maximum file size
    pub filtered_by_size: usize,
    /// Skipped because the catalog already lists them
    pub already_processed: usize,
    /// Attempted and registered (duplicates included)
    pub succeeded: usize,
    /// Subset of `succeeded` the catalog answered with a conflict
    pub duplicates: usize,
    /// Attempted and failed
    pub failed: usize,
    /// Archive bytes downloaded to disk
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
}

impl IngestStats {
    /// Fold one worker report into the counts
    pub fn record(&mut self, report: &FileReport) {
        self.bytes_downloaded += report.bytes_downloaded;
        self.record_outcome(&report.outcome);
    }

    fn record_outcome(&mut self, outcome: &ProcessingOutcome) {
        if outcome.succeeded {
            self.succeeded += 1;
            if outcome.duplicate {
                self.duplicates += 1;
            }
        } else {
            self.failed += 1;
        }
    }

    /// Archives handed to workers
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Archives skipped without an attempt
    pub fn skipped(&self) -> usize {
        self.filtered_by_size + self.already_processed
    }

    /// Add another period's counts to these
    pub fn absorb(&mut self, other: &IngestStats) {
        self.total_candidates += other.total_candidates;
        self.filtered_by_size += other.filtered_by_size;
        self.already_processed += other.already_processed;
        self.succeeded += other.succeeded;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.bytes_downloaded += other.bytes_downloaded;
        self.elapsed += other.elapsed;
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidates, {} processed ({} duplicates), {} already registered, {} too large, {} failed in {}",
            self.total_candidates,
            self.succeeded,
            self.duplicates,
            self.already_processed,
            self.filtered_by_size,
            self.failed,
            format_duration(self.elapsed)
        )
    }
}

/// How a period ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodStatus {
    /// Every pending archive was attempted
    Completed,
    /// Listed and reconciled only
    DryRun,
    /// Listing or setup failed before any archive was attempted
    Failed { reason: String },
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodStatus::Completed => f.write_str("completed"),
            PeriodStatus::DryRun => f.write_str("dry run"),
            PeriodStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of ingesting one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub batch_label: String,
    pub prefix: String,
    pub status: PeriodStatus,
    pub stats: IngestStats,
    /// One outcome per attempted archive, sorted by key
    pub outcomes: Vec<ProcessingOutcome>,
    /// Keys a dry run would have processed
    pub pending: Vec<String>,
}

impl PeriodSummary {
    /// Summary of a period that failed before any archive was attempted
    pub fn failed(batch_label: impl Into<String>, prefix: impl Into<String>, reason: String) -> Self {
        Self {
            batch_label: batch_label.into(),
            prefix: prefix.into(),
            status: PeriodStatus::Failed { reason },
            stats: IngestStats::default(),
            outcomes: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Keys whose outcome matches `succeeded`
    pub fn keys_where(&self, succeeded: bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.succeeded == succeeded)
            .map(|outcome| outcome.key.as_str())
            .collect()
    }
}

/// Result of a whole, possibly multi-period, run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub periods: Vec<PeriodSummary>,
    pub totals: IngestStats,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Append a period and fold its counts into the totals
    pub fn push(&mut self, period: PeriodSummary) {
        self.totals.absorb(&period.stats);
        self.periods.push(period);
    }

    /// Periods that failed outright
    pub fn failed_periods(&self) -> usize {
        self.periods
            .iter()
            .filter(|period| matches!(period.status, PeriodStatus::Failed { .. }))
            .count()
    }

    /// Whether any archive or period failed
    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0 || self.failed_periods() > 0
    }
}

/// Format a duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}.{:01}s", total_secs, duration.subsec_millis() / 100)
    } else if total_secs < 3600 {
        format!("{}m{}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h{}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}
