//! nwm-bridge daemon
//!
//! Runs one bridge session on a single-threaded runtime and serves it over
//! a Unix socket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nwm_bridge::compositor::SceneHost;
use nwm_bridge::config::Config;
use nwm_bridge::ipc::IpcServer;
use nwm_bridge::nwm::ChannelNwm;
use nwm_bridge::Bridge;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_arg = args
        .iter()
        .position(|arg| arg == "--config" || arg == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let loaded = match &config_arg {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let filter = loaded
        .as_ref()
        .map(|config| config.logging.filter.clone())
        .unwrap_or_else(|_| "nwm_bridge=debug,info".into());

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(filter),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting nwm-bridge");

    let config = loaded.context("Failed to load configuration")?;

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
            }
        });
    }

    let (call_tx, call_rx) = mpsc::unbounded_channel();
    let host = SceneHost::new(config.display.reserve_front_view);
    let nwm = Box::new(ChannelNwm::new(call_tx.clone()));
    let socket_path = config.ipc.socket_path();

    let mut bridge = Bridge::new(config, host, nwm, call_tx);
    let (handle, tasks) = bridge.channel();

    let server = IpcServer::new(socket_path)
        .start(handle, call_rx)
        .await
        .context("Failed to start IPC server")?;

    tokio::select! {
        _ = bridge.run(tasks) => {
            info!("Bridge finished");
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received, cleaning up...");
        }
    }

    server.shutdown();
    Ok(())
}
