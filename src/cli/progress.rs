//! Real-time progress display for ingestion runs
//!
//! Consumes the coordinator's [`ProgressEvent`] stream. On a terminal each
//! period gets an indicatif bar; otherwise a line is printed every few
//! seconds and at period boundaries.
//!
//! # Examples
//!
//! ```rust,no_run
//! use meca_ingest::app::coordinator::progress_channel;
//! use meca_ingest::cli::{ProgressConfig, ProgressDisplay};
//!
//! # async fn example() {
//! let (sink, events) = progress_channel();
//! let display = ProgressDisplay::new(ProgressConfig::default()).spawn(events);
//! // hand `sink` to the coordinator, run it, then drop it
//! # drop(sink);
//! let _ = display.await;
//! # }
//! ```

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::coordinator::{IngestStats, ProgressEvent};

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Enable visual progress bars
    pub enable_progress_bars: bool,
    /// Interval between lines in text mode
    pub text_report_interval: Duration,
    /// Maximum width for keys in the bar message
    pub max_key_width: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            text_report_interval: Duration::from_secs(10),
            max_key_width: 48,
        }
    }
}

/// Period currently being displayed
struct PeriodProgress {
    batch_label: String,
    pending: usize,
    done: usize,
    failed: usize,
    bar: Option<ProgressBar>,
}

/// Progress display driven by coordinator events
pub struct ProgressDisplay {
    config: ProgressConfig,
    is_terminal: bool,
    current: Option<PeriodProgress>,
    last_report: Instant,
}

impl ProgressDisplay {
    /// Create a new progress display with the given configuration
    pub fn new(config: ProgressConfig) -> Self {
        let is_terminal = config.enable_progress_bars && atty::is(atty::Stream::Stderr);
        Self {
            config,
            is_terminal,
            current: None,
            last_report: Instant::now(),
        }
    }

    /// Consume events until the channel closes
    pub fn spawn(mut self, mut events: mpsc::UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            self.finish_period();
            debug!("Progress event channel closed");
        })
    }

    fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::PeriodStarted {
                batch_label,
                pending,
            } => {
                self.finish_period();
                let bar = if self.is_terminal && pending > 0 {
                    Some(self.new_bar(&batch_label, pending))
                } else {
                    eprintln!("{}: {} archives to process", batch_label, pending);
                    None
                };
                self.current = Some(PeriodProgress {
                    batch_label,
                    pending,
                    done: 0,
                    failed: 0,
                    bar,
                });
                self.last_report = Instant::now();
            }

            ProgressEvent::FileFinished { outcome, .. } => {
                let max_width = self.config.max_key_width;
                let report_due = self.last_report.elapsed() >= self.config.text_report_interval;
                let Some(period) = self.current.as_mut() else {
                    return;
                };

                period.done += 1;
                if !outcome.succeeded {
                    period.failed += 1;
                }

                match &period.bar {
                    Some(bar) => {
                        bar.inc(1);
                        bar.set_message(truncate_key(&outcome.key, max_width));
                        if period.failed > 0 {
                            bar.set_prefix(format!("{} ({} failed)", period.batch_label, period.failed));
                        }
                    }
                    None if report_due => {
                        eprintln!(
                            "{}: {}/{} archives ({:.1}%), {} failed",
                            period.batch_label,
                            period.done,
                            period.pending,
                            percent(period.done, period.pending),
                            period.failed
                        );
                        self.last_report = Instant::now();
                    }
                    None => {}
                }
            }

            ProgressEvent::PeriodFinished { batch_label, stats } => {
                self.finish_period();
                eprintln!("{}: {}", batch_label, summary_line(&stats));
            }
        }
    }

    fn new_bar(&self, batch_label: &str, pending: usize) -> ProgressBar {
        let bar = ProgressBar::new(pending as u64);
        match ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            Ok(style) => bar.set_style(style.progress_chars("##-")),
            Err(e) => warn!("Progress bar template error: {}", e),
        }
        bar.set_prefix(batch_label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    fn finish_period(&mut self) {
        if let Some(period) = self.current.take() {
            if let Some(bar) = period.bar {
                bar.finish_and_clear();
            }
        }
    }
}

/// One-line summary of a period's counts
pub fn summary_line(stats: &IngestStats) -> String {
    format!(
        "processed {}, skipped {} already registered, {} too large, failed {}",
        stats.succeeded, stats.already_processed, stats.filtered_by_size, stats.failed
    )
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

/// Keep the tail of a long key, which holds the file name
fn truncate_key(key: &str, max_width: usize) -> String {
    let chars = key.chars().count();
    if chars <= max_width || max_width <= 3 {
        return key.to_string();
    }
    let tail: String = key.chars().skip(chars - (max_width - 3)).collect();
    format!("...{}", tail)
}
