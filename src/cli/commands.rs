//! Command handlers for the meca_ingest CLI
//!
//! This module implements the command handlers that turn CLI arguments and
//! the loaded configuration into a coordinator run, a catalog lookup or a
//! configuration file operation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::app::catalog::{Catalog, CatalogClient};
use crate::app::coordinator::{
    format_duration, progress_channel, Coordinator, CoordinatorConfig, PeriodStatus, RunSummary,
};
use crate::app::folder::{
    expand_batch_selector, expand_month_selector, resolve_period, PeriodRequest,
};
use crate::app::store::S3Store;
use crate::cli::progress::{summary_line, ProgressConfig, ProgressDisplay};
use crate::cli::{ConfigAction, IngestArgs};
use crate::config::AppConfig;
use crate::constants::env;
use crate::errors::{ConfigError, ConfigResult, Result};

/// Handle the ingest command
///
/// Selector, size and credential problems are reported before any store or
/// catalog traffic, and an unreachable catalog fails the command before the
/// store is listed. Per-file failures do not fail the command.
pub async fn handle_ingest(args: IngestArgs, app_config: &AppConfig, quiet: bool) -> Result<()> {
    let start_time = Instant::now();

    let server = args.server()?;
    let periods = expand_selectors(
        args.month.as_deref(),
        args.batch.as_deref(),
        Utc::now().date_naive(),
    )?;
    let config = apply_ingest_args(app_config.coordinator_config(), &args)?;
    config.validate()?;

    let client_config = app_config.client_config();
    if client_config.api_key.is_none() && !config.dry_run {
        return Err(ConfigError::MissingField {
            field: env::CATALOG_API_KEY.to_string(),
        }
        .into());
    }

    info!(
        "Ingesting {} period(s) from {} with {} workers",
        periods.len(),
        server,
        config.worker.worker_count
    );
    debug!("Periods: {:?}", periods);

    let catalog: Arc<dyn Catalog> = Arc::new(CatalogClient::new(&client_config)?);
    if !config.dry_run {
        if let Some(first) = periods.first() {
            let label = resolve_period(first, server)?.batch_label;
            preflight_catalog(catalog.as_ref(), &label).await?;
        }
    }
    let store = Arc::new(S3Store::new(app_config.store.clone()).await);

    let dry_run = config.dry_run;
    let (sink, events) = progress_channel();
    let coordinator = Coordinator::new(config, store, catalog).with_progress(sink);
    let signal_task = coordinator.install_signal_handler();

    let progress_config = ProgressConfig {
        enable_progress_bars: !quiet,
        ..Default::default()
    };
    let display = ProgressDisplay::new(progress_config).spawn(events);

    let result = coordinator.run(&periods, server).await;

    // Dropping the coordinator closes the progress channel
    drop(coordinator);
    if let Err(e) = display.await {
        warn!("Progress display task failed: {}", e);
    }
    signal_task.abort();

    let summary = result?;
    print_run_summary(&summary, dry_run);
    info!("Ingest command finished in {:?}", start_time.elapsed());
    Ok(())
}

/// Make one single-row listing request against the catalog
///
/// Any failure here is fatal for the run.
pub async fn preflight_catalog(catalog: &dyn Catalog, period: &str) -> Result<()> {
    match catalog.list_registered(period, 1, 0).await {
        Ok(_) => {
            debug!("Catalog reachable");
            Ok(())
        }
        Err(e) => {
            error!("Catalog unreachable: {}", e);
            Err(e.into())
        }
    }
}

/// Handle the fetch command
pub async fn handle_fetch(doi: &str, app_config: &AppConfig) -> Result<()> {
    let client = CatalogClient::new(&app_config.client_config())?;
    match client.fetch_work(doi.trim()).await? {
        Some(work) => {
            println!("DOI:           {}", work.doi);
            println!("Version:       {}", work.version);
            println!("Title:         {}", work.title.as_deref().unwrap_or("-"));
            println!("Received:      {}", work.received_date.as_deref().unwrap_or("-"));
            println!("Accepted:      {}", work.accepted_date.as_deref().unwrap_or("-"));
            println!(
                "Server:        {}",
                work.server.map(|s| s.slug()).unwrap_or("-")
            );
            println!("Batch:         {}", work.batch.as_deref().unwrap_or("-"));
            println!("Object key:    {}", work.s3_key.as_deref().unwrap_or("-"));
            if let Some(size) = work.file_size {
                println!("Archive size:  {} bytes", size);
            }
        }
        None => println!("No work registered for DOI {}", doi),
    }
    Ok(())
}

/// Handle the config command
pub async fn handle_config(
    action: ConfigAction,
    config_path: Option<PathBuf>,
    app_config: &AppConfig,
) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = AppConfig::initialize(config_path, force).await?;
            println!("Wrote default configuration to {}", path.display());
            println!("Set {} in the environment or .env before ingesting.", env::CATALOG_API_KEY);
        }
        ConfigAction::Show => {
            print!("{}", app_config.to_display_toml()?);
        }
    }
    Ok(())
}

/// Expand `--month` / `--batch` into periods; exactly one must be given
pub fn expand_selectors(
    month: Option<&str>,
    batch: Option<&str>,
    today: NaiveDate,
) -> ConfigResult<Vec<PeriodRequest>> {
    match (month, batch) {
        (Some(month), None) => expand_month_selector(month, today),
        (None, Some(batch)) => expand_batch_selector(batch),
        _ => Err(ConfigError::AmbiguousSelector),
    }
}

/// Layer the ingest flags over the configured defaults
pub fn apply_ingest_args(
    mut config: CoordinatorConfig,
    args: &IngestArgs,
) -> ConfigResult<CoordinatorConfig> {
    if let Some(count) = args.concurrency {
        config.worker.worker_count = count;
    }
    if let Some(output) = &args.output {
        config.worker.output_dir = output.clone();
    }
    config.worker.keep |= args.keep;
    config.worker.full_extract |= args.full_extract;
    config.worker.ranged_reads |= args.ranged;

    let max_file_size = args.max_file_size.as_deref().map(parse_size).transpose()?;
    Ok(config
        .with_limit(args.limit)
        .with_max_file_size(max_file_size)
        .with_force(args.force)
        .with_dry_run(args.dry_run))
}

/// Parse a human-readable size: plain bytes or a number with a B/KB/MB/GB/TB unit
///
/// Units are binary, so `1KB` is 1024 bytes.
pub fn parse_size(input: &str) -> ConfigResult<u64> {
    let invalid = || ConfigError::InvalidSize {
        input: input.to_string(),
    };

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(invalid()),
    };

    if number.is_empty() {
        return Err(invalid());
    }
    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier).ok_or_else(invalid);
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes.round() as u64)
}

fn print_run_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    for period in &summary.periods {
        match &period.status {
            PeriodStatus::Completed => {
                println!("{}: {}", period.batch_label, summary_line(&period.stats));
                for key in period.keys_where(false) {
                    let reason = period
                        .outcomes
                        .iter()
                        .find(|outcome| outcome.key == key)
                        .and_then(|outcome| outcome.error.as_ref())
                        .map(|error| format!("{}: {}", error.kind, error.message))
                        .unwrap_or_default();
                    println!("  failed {} ({})", key, reason);
                }
            }
            PeriodStatus::DryRun => {
                println!(
                    "{}: would process {} archives ({} already registered, {} too large)",
                    period.batch_label,
                    period.pending.len(),
                    period.stats.already_processed,
                    period.stats.filtered_by_size
                );
                for key in &period.pending {
                    println!("  {}", key);
                }
            }
            PeriodStatus::Failed { reason } => {
                println!("{}: FAILED - {}", period.batch_label, reason);
            }
        }
    }

    if summary.periods.len() > 1 || dry_run {
        println!();
    }
    let totals = &summary.totals;
    println!(
        "Total: {} in {}",
        summary_line(totals),
        format_duration(summary.elapsed)
    );
    if totals.duplicates > 0 {
        println!("  ({} registrations were already present in the catalog)", totals.duplicates);
    }
    if summary.failed_periods() > 0 {
        println!("  {} period(s) failed outright", summary.failed_periods());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Server as MockServer;

    use super::*;
    use crate::app::catalog::{ClientConfig, MemoryCatalog};
    use crate::errors::AppError;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("100MB").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("1.5GB").unwrap(), 1_610_612_736);
        assert_eq!(parse_size(" 2 kb ").unwrap(), 2048);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        for input in ["", "MB", "ten", "1.2.3MB", "5XB", "-1GB"] {
            assert!(
                matches!(parse_size(input), Err(ConfigError::InvalidSize { .. })),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_selectors_require_exactly_one() {
        assert!(matches!(
            expand_selectors(None, None, today()),
            Err(ConfigError::AmbiguousSelector)
        ));
        assert!(matches!(
            expand_selectors(Some("2024-01"), Some("3"), today()),
            Err(ConfigError::AmbiguousSelector)
        ));

        let months = expand_selectors(Some("2024-*"), None, today()).unwrap();
        assert_eq!(months.len(), 3);
        let batches = expand_selectors(None, Some("1-3"), today()).unwrap();
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_apply_ingest_args_overrides_defaults() {
        let args = IngestArgs {
            month: Some("2024-01".to_string()),
            concurrency: Some(5),
            output: Some(PathBuf::from("/tmp/meca")),
            keep: true,
            max_file_size: Some("100MB".to_string()),
            dry_run: true,
            ranged: true,
            limit: Some(10),
            server: "biorxiv".to_string(),
            ..Default::default()
        };

        let config = apply_ingest_args(CoordinatorConfig::default(), &args).unwrap();
        assert_eq!(config.worker.worker_count, 5);
        assert_eq!(config.worker.output_dir, PathBuf::from("/tmp/meca"));
        assert!(config.worker.keep && config.worker.ranged_reads);
        assert!(!config.worker.full_extract);
        assert_eq!(config.max_file_size, Some(100 * 1024 * 1024));
        assert_eq!(config.limit, Some(10));
        assert!(config.dry_run && !config.force);
    }

    #[test]
    fn test_bad_size_flag_is_config_error() {
        let args = IngestArgs {
            max_file_size: Some("huge".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            apply_ingest_args(CoordinatorConfig::default(), &args),
            Err(ConfigError::InvalidSize { .. })
        ));
    }

    fn client_for(server: &MockServer) -> CatalogClient {
        let config = ClientConfig {
            base_url: server.url(),
            api_key: Some("secret".to_string()),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        CatalogClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_unavailable_catalog_fails_preflight() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("GET", "/bucket/list")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = preflight_catalog(&client, "January_2024").await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reachable_catalog_passes_preflight() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("GET", "/bucket/list")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"files": [], "pagination": {"total": 0, "limit": 1, "offset": 0, "hasMore": false}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        tokio_test::assert_ok!(preflight_catalog(&client, "January_2024").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_listing_fails_preflight() {
        let catalog = MemoryCatalog::new();
        catalog.fail_bulk_listing(true);
        assert!(preflight_catalog(&catalog, "January_2024").await.is_err());
    }
}
