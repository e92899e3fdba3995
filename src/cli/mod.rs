//! Command-line interface components
//!
//! This module contains CLI-specific code for meca_ingest: argument parsing,
//! command handlers and the progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, ConfigAction, ConfigArgs, GlobalArgs, IngestArgs};
pub use commands::{
    apply_ingest_args, expand_selectors, handle_config, handle_fetch, handle_ingest, parse_size,
    preflight_catalog,
};
pub use progress::{ProgressConfig, ProgressDisplay};
