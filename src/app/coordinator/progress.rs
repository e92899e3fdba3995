//! Progress events emitted by the coordinator
//!
//! Events are sent on an unbounded channel so a slow display never holds up
//! the pipeline; a closed receiver is ignored.

use tokio::sync::mpsc;
use tracing::trace;

use super::stats::IngestStats;
use crate::app::models::ProcessingOutcome;

/// Milestones of an ingestion run
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A period was listed and reconciled; `pending` archives will be attempted
    PeriodStarted {
        batch_label: String,
        pending: usize,
    },
    /// One archive finished, successfully or not
    FileFinished {
        batch_label: String,
        outcome: ProcessingOutcome,
    },
    /// A period is done
    PeriodFinished {
        batch_label: String,
        stats: IngestStats,
    },
}

/// Optional sender for progress events
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// Sink that forwards to `tx`
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                trace!("Progress receiver closed, dropping event");
            }
        }
    }
}

/// Create a progress channel
pub fn progress_channel() -> (ProgressSink, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSink::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let (sink, mut rx) = progress_channel();
        sink.emit(ProgressEvent::PeriodStarted {
            batch_label: "January_2024".to_string(),
            pending: 3,
        });

        match rx.recv().await {
            Some(ProgressEvent::PeriodStarted { batch_label, pending }) => {
                assert_eq!(batch_label, "January_2024");
                assert_eq!(pending, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_disabled_and_closed_sinks_do_not_fail() {
        ProgressSink::disabled().emit(ProgressEvent::PeriodFinished {
            batch_label: "Batch_01".to_string(),
            stats: IngestStats::default(),
        });

        let (sink, rx) = progress_channel();
        drop(rx);
        sink.emit(ProgressEvent::PeriodFinished {
            batch_label: "Batch_01".to_string(),
            stats: IngestStats::default(),
        });
    }
}
