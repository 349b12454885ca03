// anonymize-it - Record anonymization pipeline
// Copyright (c) 2025 anonymize-it Contributors
// Licensed under the MIT License

use anonymize_it::cli::commands::EXIT_FATAL;
use anonymize_it::cli::{Cli, Commands};
use anonymize_it::config::LoggingConfig;
use anonymize_it::log_error_with_context;
use anonymize_it::logging::init_logging;
use clap::Parser;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Console-only logging for the CLI
    let log_level = cli.log_level.as_deref().unwrap_or("info");
    let _guard = match init_logging(log_level, &LoggingConfig::default()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e}");
            process::exit(EXIT_FATAL);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "anonymize-it - Record anonymization pipeline"
    );

    // Create shutdown signal channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_shutdown(shutdown_tx));

    let exit_code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            log_error_with_context!(&e, "Command execution failed");
            eprintln!("Error: {e}");
            EXIT_FATAL
        }
    };

    process::exit(exit_code);
}

/// Sets the shutdown flag on SIGINT or SIGTERM
async fn wait_for_shutdown(shutdown_tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                None
            }
        };
        let terminate = async {
            match sigterm.as_mut() {
                Some(sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
    }

    println!("\n⚠️  Shutdown signal received, completing current batch...");
    let _ = shutdown_tx.send(true);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Anonymize(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
        Commands::Providers(args) => args.execute().await,
    }
}
