//! Flowcol - IPFIX collector
//!
//! # Usage
//!
//! ```bash
//! # Listen on UDP 4739 with the default pipeline
//! flowcol
//! flowcol --config configs/flowcol.toml
//!
//! # Replay a capture file through the pipeline, then exit
//! flowcol --config configs/replay.toml
//! ```

mod config;
mod input;
mod serve;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Flowcol - IPFIX (RFC 7011) collector
#[derive(Parser, Debug)]
#[command(name = "flowcol")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/flowcol.toml")]
    config: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = Config::load(&cli.config)?;
    config.validate()?;
    serve::run(config)
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
