//! Playlist Bridge - converts playlists between music services.
//!
//! Reads an ordered track list from a source, finds each track in the
//! destination catalog with bounded concurrency, and builds the matching
//! destination playlist. Progress is checkpointed per job so interrupted
//! or failed conversions resume where they stopped.

pub mod auth;
pub mod catalog;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log directive used when `RUST_LOG` does not mention this crate
const DEFAULT_LOG_DIRECTIVE: &str = "playlist_bridge=info";

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(DEFAULT_LOG_DIRECTIVE.parse()?))
        .init();

    cli::run_command(&args)
}
