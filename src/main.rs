//! sticky-modifiers-daemon: one-shot modifier engine for a keyboard event pipeline
//!
//! This daemon provides:
//! - A keymap turning key position changes into binding callbacks
//! - Sticky modifiers: tap to arm, applied to the next key, double tap to lock
//! - Keyboard report tracking of the resulting keycode stream
//! - IPC server for feeding key input and subscribing to output
//!
//! Out of scope:
//! - Key matrix scanning and debouncing (positions arrive over IPC)
//! - USB/BLE transport of the report

mod behaviors;
mod bus;
mod config;
mod dispatch;
mod events;
mod hid;
mod ipc;
mod keymap;
mod keys;
mod lifecycle;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::events::OutputEvent;
use crate::ipc::Server;
use crate::keymap::Keymap;
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "sticky-modifiers-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.keymap_path, "configuration loaded");

    let keymap = Keymap::load_or_default(&config.keymap_path)
        .context("failed to load keymap")?;

    let mut shutdown = ShutdownSignal::new()?;

    // IPC server -> dispatcher
    let (input_tx, input_rx) = mpsc::channel(config.input_queue);
    // Dispatcher -> IPC subscribers
    let (output_tx, _output_rx) = broadcast::channel::<OutputEvent>(256);

    let mut dispatcher = Dispatcher::new(keymap, output_tx.clone());

    let server = Server::new(&config.socket_path, input_tx, output_tx.clone())?;

    // Keep the status view in sync with the dispatcher
    let mut status_rx = output_tx.subscribe();
    let server_for_status = &server;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the dispatcher (processes key input)
        _ = dispatcher.run(input_rx) => {
            info!("dispatcher exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(OutputEvent::StickyState(snapshot)) => {
                        server_for_status.set_sticky_state(snapshot).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "status receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("status sync exited");
        }

        // Wait for shutdown signal
        signal = shutdown.wait() => {
            info!(signal, "shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("sticky-modifiers-daemon stopped");

    Ok(())
}
