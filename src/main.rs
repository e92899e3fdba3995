//! meca_ingest CLI application
//!
//! Command-line interface for ingesting bioRxiv/medRxiv MECA archives into a
//! metadata catalog.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use meca_ingest::cli::{handle_config, handle_fetch, handle_ingest, Cli, Commands};
use meca_ingest::config::AppConfig;
use meca_ingest::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await?;

    init_logging(&cli, &config.logging.level);

    info!("meca_ingest v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Ingest(args) => {
            info!("Executing ingest command");
            handle_ingest(args, &config, cli.global.quiet).await
        }
        Commands::Fetch { doi } => {
            info!("Executing fetch command");
            handle_fetch(&doi, &config).await
        }
        Commands::Config(args) => handle_config(args.action, cli.global.config, &config).await,
    }
}

/// Initialize logging from the CLI flags, falling back to the configured level
fn init_logging(cli: &Cli, configured_level: &str) {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| configured_level.to_lowercase());

    let mut filter = EnvFilter::from_default_env();
    match format!("meca_ingest={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log level '{}': {}", level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
