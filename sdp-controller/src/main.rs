//! SDP Controller - control plane for a Software-Defined-Perimeter network
//!
//! Authenticates clients and gateways over mutual TLS, rotates their
//! credentials and hands gateways their access lists.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sdp_controller::tls::TlsServerConfig;
use sdp_controller::{
    Controller, ControllerConfig, NoopNotifier, RandomCredentialMaker, SessionContext,
    SqlDirectory,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Definition
// ============================================================================

/// SDP Controller - credential and access policy server
#[derive(Parser)]
#[command(name = "sdp-controller", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    config: ControllerConfig,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the controller (default if no command given)
    Serve,

    /// Create or upgrade the member directory schema, then exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.config.debug);

    cli.config.validate().context("invalid configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(cli.config).await,
        Commands::Migrate => cmd_migrate(cli.config).await,
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

/// Apply migrations to the directory database.
async fn cmd_migrate(config: ControllerConfig) -> Result<()> {
    tracing::info!(path = %config.database.display(), "Migrating member directory");
    SqlDirectory::open(&config.database, 1)
        .await
        .context("failed to open member directory")?;
    tracing::info!("Member directory schema is up to date");
    Ok(())
}

/// Start the controller.
async fn cmd_serve(config: ControllerConfig) -> Result<()> {
    let tls_paths = config.tls_paths()?;
    let tls = TlsServerConfig::from_paths(&tls_paths).context("failed to load TLS material")?;

    tracing::info!(path = %config.database.display(), "Opening member directory");
    let directory = SqlDirectory::open(&config.database, config.db_pool_size)
        .await
        .context("failed to open member directory")?;

    let generator = RandomCredentialMaker::new(config.encryption_key_len, config.hmac_key_len)?;

    let ctx = SessionContext {
        directory: Arc::new(directory),
        generator: Arc::new(generator),
        notifier: Arc::new(NoopNotifier),
        policy: config.session_policy(),
    };

    let controller = Controller::bind(
        config.listen,
        tls.into_rustls_config(),
        ctx,
        config.max_connections as usize,
        config.idle_timeout(),
    )
    .await
    .with_context(|| format!("failed to listen on {}", config.listen))?;

    controller.run(shutdown_signal()).await;

    tracing::info!("Controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
