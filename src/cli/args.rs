//! Command-line argument parsing for meca_ingest
//!
//! This module defines the CLI structure using clap derive macros: the
//! `ingest` pipeline command, a single-record `fetch`, and configuration
//! management.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::models::Server;
use crate::errors::ConfigResult;

/// meca_ingest - Register bioRxiv and medRxiv MECA archives in a catalog
#[derive(Parser, Debug)]
#[command(
    name = "meca_ingest",
    version,
    about = "Ingest bioRxiv/medRxiv MECA archives from S3 into a metadata catalog",
    long_about = "Lists the MECA archives of a month or back-content batch in the requester-pays
preprint buckets, skips those the catalog already knows, and for every remaining archive
extracts the JATS article XML, parses its metadata and registers the manuscript version."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the archives of one or more months or batches
    Ingest(IngestArgs),

    /// Look up a single registered work by DOI
    Fetch {
        /// DOI, e.g. 10.1101/2024.01.15.575123
        #[arg(value_name = "DOI")]
        doi: String,
    },

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the ingest command
#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Month selector: 2024-01, January_2024, 2024-01,2024-02 or 2024-*
    #[arg(short, long, value_name = "MONTH")]
    pub month: Option<String>,

    /// Back-content batch selector: 3, Batch_03, medRxiv_Batch_03, 1-5 or 1,4,7
    #[arg(short, long, value_name = "BATCH")]
    pub batch: Option<String>,

    /// Maximum number of archives listed per period
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Number of concurrent pipeline workers
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Scratch directory for downloaded archives
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Keep archives (and fully extracted trees) after processing
    #[arg(long)]
    pub keep: bool,

    /// Decompress whole archives instead of the article entry only
    #[arg(long)]
    pub full_extract: bool,

    /// Skip archives larger than this, e.g. 100MB, 1.5GB or plain bytes
    #[arg(long, value_name = "SIZE")]
    pub max_file_size: Option<String>,

    /// Process archives even when the catalog already lists them
    #[arg(short, long)]
    pub force: bool,

    /// List and reconcile only; report what would be processed
    #[arg(long)]
    pub dry_run: bool,

    /// Preprint server whose bucket is read
    #[arg(short, long, default_value = "biorxiv")]
    pub server: String,

    /// Read article XML with ranged GETs instead of downloading archives
    #[arg(long)]
    pub ranged: bool,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested on the command line, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

impl IngestArgs {
    /// Parse the `--server` value
    pub fn server(&self) -> ConfigResult<Server> {
        self.server.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigError;

    #[test]
    fn test_ingest_flags_parse() {
        let cli = Cli::try_parse_from([
            "meca_ingest",
            "ingest",
            "--month",
            "2024-01",
            "--concurrency",
            "5",
            "--max-file-size",
            "1.5GB",
            "--dry-run",
            "--server",
            "medrxiv",
            "--ranged",
        ])
        .unwrap();

        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest command");
        };
        assert_eq!(args.month.as_deref(), Some("2024-01"));
        assert_eq!(args.batch, None);
        assert_eq!(args.concurrency, Some(5));
        assert_eq!(args.max_file_size.as_deref(), Some("1.5GB"));
        assert!(args.dry_run && args.ranged);
        assert!(!args.keep && !args.force);
        assert_eq!(args.server().unwrap(), Server::Medrxiv);
    }

    #[test]
    fn test_server_defaults_and_rejects_unknown() {
        let args = IngestArgs {
            server: "biorxiv".to_string(),
            ..Default::default()
        };
        assert_eq!(args.server().unwrap(), Server::Biorxiv);

        let args = IngestArgs {
            server: "arxiv".to_string(),
            ..Default::default()
        };
        assert!(matches!(args.server(), Err(ConfigError::UnknownServer { .. })));
    }

    #[test]
    fn test_fetch_and_config_commands() {
        let cli = Cli::try_parse_from(["meca_ingest", "fetch", "10.1101/2024.01.15.575123"]).unwrap();
        assert!(matches!(cli.command, Commands::Fetch { ref doi } if doi == "10.1101/2024.01.15.575123"));

        let cli = Cli::try_parse_from(["meca_ingest", "--config", "x.toml", "config", "init", "--force"])
            .unwrap();
        assert_eq!(cli.global.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Init { force: true }
            })
        ));
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::try_parse_from(["meca_ingest", "-q", "config", "show"]).unwrap();
        assert_eq!(cli.log_level(), Some(tracing::Level::ERROR));

        let cli = Cli::try_parse_from(["meca_ingest", "config", "show", "-v"]).unwrap();
        assert_eq!(cli.log_level(), Some(tracing::Level::INFO));

        let cli = Cli::try_parse_from(["meca_ingest", "config", "show"]).unwrap();
        assert_eq!(cli.log_level(), None);
    }
}
