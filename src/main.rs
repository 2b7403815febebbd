//! minicache - A networked in-memory cache node
//!
//! Configured from environment variables; see [`minicache::Config::from_env`].

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use minicache::{Config, Server, ShutdownHandle};

/// Main entry point for a cache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Bind the listener and start background tasks
/// 4. Join the seed node, if one is configured
/// 5. Serve until SIGINT/SIGTERM/SIGQUIT, then shut down gracefully
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minicache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting minicache node");

    let config = Config::from_env();
    info!(
        listen_addr = %config.listen_addr,
        sweep_interval_ms = config.sweep_interval_ms,
        forward_timeout_ms = config.forward_timeout_ms,
        join_addr = ?config.join_addr,
        "Configuration loaded"
    );

    let join_addr = config.join_addr.clone();
    let listen_addr = config.listen_addr.clone();
    let server = Server::bind(&listen_addr, config)
        .await
        .context("failed to start server")?;

    if let Some(seed) = join_addr {
        server
            .join(&seed)
            .await
            .with_context(|| format!("failed to join seed node {seed}"))?;
    }

    tokio::spawn(shutdown_signal(server.shutdown_handle()));

    server.run().await?;
    info!("Node shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C, SIGTERM or SIGQUIT and triggers shutdown.
async fn shutdown_signal(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::SignalKind;
        match (
            signal::unix::signal(SignalKind::terminate()),
            signal::unix::signal(SignalKind::quit()),
        ) {
            (Ok(mut term), Ok(mut quit)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = quit.recv() => {}
                }
            }
            _ => {
                tracing::error!("failed to install SIGTERM/SIGQUIT handlers");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received termination signal, initiating shutdown...");
        }
    }

    handle.shutdown();
}
