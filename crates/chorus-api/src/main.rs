//! Chorus CLI entry point.
//!
//! Binary name: `chorus`
//!
//! Parses CLI arguments, installs logging, initializes configuration and the
//! memory database, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use state::AppState;

// Personas share one cooperative scheduler; see `PersonaRuntime`.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        // Shell completions don't need app state
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "chorus", &mut std::io::stdout());
        }

        Commands::Check => {
            cli::check::check(&cli.config, cli.json).await?;
        }

        Commands::Memory { action } => {
            let state = AppState::init(&cli.config).await?;
            cli::memory::dispatch(&state, action, cli.json).await?;
        }

        Commands::Run => {
            let state = AppState::init(&cli.config).await?;
            cli::run::run(&state, shutdown_signal()).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins when set; otherwise verbosity flags pick the level.
fn default_filter(quiet: bool, verbose: u8) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "info,chorus_api=debug,chorus_core=debug,chorus_infra=debug",
        _ => "trace",
    }
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.quiet, cli.verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
