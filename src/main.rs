//! Meditation Timer CLI
//!
//! A countdown timer for meditation sessions. `meditimer daemon` hosts the
//! timer; every other command talks to it over a Unix socket.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use meditimer::cli::{Cli, Commands, Display, IpcClient};
use meditimer::config::DaemonConfig;
use meditimer::daemon::server;

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(default_level(&cli));

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn default_level(cli: &Cli) -> &'static str {
    match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Some(Commands::Daemon), false) => "info",
        _ => "warn",
    }
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `default_level`.
fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        // No command provided, show help
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        generate_completions(shell);
        return Ok(());
    }

    let mut config = DaemonConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(socket) = cli.socket {
        config = config.with_socket_path(socket);
    }

    let client = IpcClient::with_socket_path(config.socket_path.clone());

    match command {
        Commands::Duration { minutes } => {
            let response = client.set_duration(minutes).await?;
            Display::show_success(&response);
        }
        Commands::Start => {
            let response = client.start().await?;
            Display::show_success(&response);
        }
        Commands::Pause => {
            let response = client.pause().await?;
            Display::show_success(&response);
        }
        Commands::Resume => {
            let response = client.resume().await?;
            Display::show_success(&response);
        }
        Commands::Reset => {
            let response = client.reset().await?;
            Display::show_success(&response);
        }
        Commands::Status => {
            let response = client.status().await?;
            Display::show_status(&response);
        }
        Commands::Watch => {
            tokio::select! {
                result = client.watch(Display::show_watch_line) => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Commands::Daemon => server::run(config).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
