//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::config::RunArgs;

#[derive(Debug, Parser)]
#[command(
    name = "unscrobbler",
    about = "Remove Last.fm scrobbles by artist or track title, optionally narrowed by year and time of day",
    version,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Prune the listing (default).
    Run {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Check that every row of a listing snapshot parses.
    Validate {
        /// Listing snapshot to check.
        listing: PathBuf,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

impl Cli {
    /// Options for a pruning run, whether given before or after `run`.
    /// `None` for the other subcommands.
    pub fn run_args(&self) -> Option<&RunArgs> {
        match &self.command {
            None => Some(&self.run),
            Some(Commands::Run { args }) => Some(args),
            Some(_) => None,
        }
    }
}
