//! Command-line interface for Outpost
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Outpost - graded health monitor for remote services
#[derive(Parser)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "outpost.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start monitoring and serve the status API (Ctrl+C to stop)
    Run {
        /// Override the status API listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration
    Check,

    /// Probe a URL once and report the result
    Probe {
        /// URL to probe
        url: String,

        /// Retry with exponential backoff up to this many attempts
        #[arg(short, long)]
        retries: Option<u32>,

        /// Request timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Show service status from a running instance
    Status {
        /// Address of the running instance
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        addr: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "outpost", &mut std::io::stdout());
    }
}
