//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `convert`: Run a conversion with live progress
//! - `checkpoint`: Inspect or clear saved progress
//! - `config`: Show or initialize the config file

mod checkpoint;
mod config;
mod convert;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

pub use checkpoint::{cmd_checkpoint_clear, cmd_checkpoint_show};
pub use config::{cmd_config_init, cmd_config_show};
pub use convert::cmd_convert;

/// Playlist Bridge CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: OS config directory)
    #[arg(long, global = true, env = "PLAYLIST_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Convert a source playlist into a destination playlist
    Convert {
        /// Source reference (path to a playlist manifest)
        source: String,
        /// Tracks resolved at once
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Catalog bridge base URL
        #[arg(long, env = "PLAYLIST_BRIDGE_URL")]
        bridge_url: Option<String>,
        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Inspect or clear saved conversion progress
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Show or initialize the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Checkpoint subcommands
#[derive(Subcommand)]
pub enum CheckpointAction {
    /// Show saved progress for a source
    Show {
        /// Source reference
        source: String,
    },
    /// Delete saved progress for a source
    Clear {
        /// Source reference
        source: String,
    },
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Convert {
            source,
            concurrency,
            bridge_url,
            json,
        } => {
            let config = crate::config::load(config_path);
            cmd_convert(&rt, config, source, *concurrency, bridge_url.as_deref(), *json)
        }
        Commands::Checkpoint { action } => {
            let config = crate::config::load(config_path);
            match action {
                CheckpointAction::Show { source } => cmd_checkpoint_show(&rt, &config, source),
                CheckpointAction::Clear { source } => cmd_checkpoint_clear(&rt, &config, source),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(config_path),
            ConfigAction::Init { force } => cmd_config_init(config_path, *force),
        },
    }
}
