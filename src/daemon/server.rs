//! Daemon process: wires the engine to its store, clock and IPC socket.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::clock::SystemClock;
use super::ipc::{IpcServer, RequestHandler};
use super::store::{JsonFileStore, StateStore};
use super::timer::{TimerEngine, TimerEvent};
use crate::config::DaemonConfig;

/// Opens the snapshot file store.
///
/// An unreadable file never disables persistence: the store starts empty on
/// the same path and the next state change rewrites it.
pub fn open_store(config: &DaemonConfig) -> Arc<dyn StateStore> {
    let store = JsonFileStore::open_or_recover(&config.state_path);
    debug!("Using state file {:?}", store.path());
    Arc::new(store)
}

/// Runs the daemon until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let engine = Arc::new(TimerEngine::new(
        config.timer.clone(),
        Arc::new(SystemClock),
        open_store(&config),
        event_tx,
    ));
    tokio::spawn(log_events(event_rx));

    let server = IpcServer::new(&config.socket_path)
        .with_context(|| format!("Failed to start daemon on {:?}", config.socket_path))?;
    info!("Daemon listening on {:?}", server.socket_path());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    serve_until(&server, RequestHandler::new(engine.clone()), shutdown).await;
    info!("Daemon shutting down");
    if let Err(e) = engine.flush() {
        error!("Timer state may be stale after restart: {}", e);
    }
    Ok(())
}

/// Accepts connections until `shutdown` resolves.
///
/// Each connection is served on its own task, so a `watch` client never
/// blocks other commands.
pub async fn serve_until<F>(server: &IpcServer, handler: RequestHandler, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.serve(stream).await {
                            debug!("Connection ended with error: {:#}", e);
                        }
                    });
                }
                Err(e) => warn!("Accept failed: {:#}", e),
            },
        }
    }
}

/// Drains lifecycle events until the engine goes away.
async fn log_events(mut events: mpsc::UnboundedReceiver<TimerEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Timer event: {:?}", event);
    }
}
