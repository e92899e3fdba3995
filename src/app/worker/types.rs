//! Worker type definitions

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::archive::ExtractionStrategy;
use crate::app::models::ProcessingOutcome;

/// Pipeline stage a worker is in for its current archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerStage {
    Downloading,
    Extracting,
    Parsing,
    Registering,
    CleaningUp,
}

impl fmt::Display for WorkerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerStage::Downloading => "download",
            WorkerStage::Extracting => "extract",
            WorkerStage::Parsing => "parse",
            WorkerStage::Registering => "register",
            WorkerStage::CleaningUp => "cleanup",
        };
        f.write_str(name)
    }
}

/// How the article XML was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRoute {
    /// Downloaded, then extracted with the given strategy
    Local(ExtractionStrategy),
    /// Read with ranged GETs, never downloaded
    Ranged,
}

impl ExtractionRoute {
    /// Strategy that decides what cleanup may keep
    pub fn strategy(&self) -> ExtractionStrategy {
        match self {
            ExtractionRoute::Local(strategy) => *strategy,
            ExtractionRoute::Ranged => ExtractionStrategy::Selective,
        }
    }
}

/// Result of one archive, sent from a worker to the coordinator
#[derive(Debug, Clone)]
pub struct FileReport {
    /// ID of the worker that processed the archive
    pub worker_id: u32,
    pub outcome: ProcessingOutcome,
    /// Stage the pipeline reached, the failing one for failures; `None` after a panic
    pub stage: Option<WorkerStage>,
    /// Extraction route, when extraction was reached
    pub route: Option<ExtractionRoute>,
    /// Bytes of archive downloaded to disk
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
}

/// Current state of the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Pool has been created but not started
    Created,
    /// Workers are draining the queue
    Running,
    /// Workers have been joined or aborted
    Finished,
}
