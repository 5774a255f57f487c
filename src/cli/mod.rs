//! Command-line interface for playlist-bridge.
//!
//! This module provides CLI commands for converting playlists, inspecting
//! saved progress and managing the config file.

mod commands;

pub use commands::{Cli, Commands, run_command};
