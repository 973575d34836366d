//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::config::runtime::SharedConfig;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C). A handler that cannot be
/// installed is logged and never fires.
pub async fn shutdown_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    let sigint = async {
        match signal(SignalKind::interrupt()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGINT handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Only the webhook secret and the rate limit are swapped in; channel
/// capacities, the listen address and the expiry interval need a restart.
/// The task ends when `shutdown_rx` turns true.
pub fn spawn_config_reload_handler(
    config: SharedConfig,
    config_loader: Arc<ConfigLoader>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to install SIGHUP handler, reload disabled: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = billflow_core::events::wait_for_shutdown(&mut shutdown_rx) => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            *config.payments.write().await = loaded_config.payments;
                            *config.rate_limit.write().await = loaded_config.rate_limit;
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
            }
        }
    })
}
