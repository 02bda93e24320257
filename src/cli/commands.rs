//! Command definitions for the meditation timer CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

// ============================================================================
// CLI Structure
// ============================================================================

/// Meditation timer CLI
#[derive(Parser, Debug)]
#[command(
    name = "meditimer",
    version,
    about = "A countdown timer for meditation sessions",
    long_about = "A countdown timer for meditation sessions.\n\
                  The timer runs in a background daemon; this CLI sends it commands \
                  over a Unix socket.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path of the daemon socket (overrides the config file)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Path of the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Set the session length (only while not running)
    Duration {
        /// Session length in minutes
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        minutes: u32,
    },

    /// Start the countdown
    Start,

    /// Pause the countdown
    Pause,

    /// Resume a paused countdown
    Resume,

    /// Rewind to the full session length
    Reset,

    /// Show current timer status
    Status,

    /// Follow the countdown until interrupted
    Watch,

    /// Run the timer daemon in the foreground
    Daemon,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Tests
// ============================================================================
