//! CLI argument definitions for Skywatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Skywatch - a headless track reconciliation and chat choreography engine.
///
/// `skw run` replays a JSONL stream of channel events and driver directives
/// through a fresh engine and prints the resulting picture.
#[derive(Parser, Debug)]
#[command(name = "skw")]
#[command(author, version, about = "Track reconciliation and chat choreography engine", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Base URL of the chat/classification backend.
    /// Can also be set via the SKW_API_URL environment variable.
    #[arg(long = "api-url", global = true, env = "SKW_API_URL")]
    pub api_url: Option<String>,

    /// Directory for persisted state (downed targets, popup seeds).
    /// Can also be set via the SKW_DATA_DIR environment variable.
    #[arg(long = "data-dir", global = true, env = "SKW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSONL event stream through the engine and print the picture
    ///
    /// Each line is either a channel frame ({"event": ..., "data": ...}) or
    /// a driver directive: {"tick": MS}, {"select": ID}, {"chat": TEXT},
    /// {"button": {...}}, {"toggleTrail": ID}, {"toggleRadars": true}.
    Run {
        /// Read events from this file instead of stdin
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Fetch and list the radar stations known to the backend
    Radars,
}
