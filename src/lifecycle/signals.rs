//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a route definition refresh, not shutdown
//! - Only Ctrl+C is available off Unix

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;
use crate::locator::refresh::RefreshHandle;

/// Listen for OS signals until shutdown.
pub fn spawn_signal_handler(shutdown: Shutdown, refresh: RefreshHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = handle_signals(&shutdown, &refresh).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    })
}

#[cfg(unix)]
async fn handle_signals(shutdown: &Shutdown, refresh: &RefreshHandle) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, refreshing route definitions");
                if let Err(e) = refresh.refresh() {
                    tracing::error!(error = %e, "Failed to request refresh");
                }
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received");
                shutdown.trigger();
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Ctrl+C received");
                shutdown.trigger();
            }
            _ = shutdown.wait() => return Ok(()),
        }
    }
}

#[cfg(not(unix))]
async fn handle_signals(shutdown: &Shutdown, _refresh: &RefreshHandle) -> std::io::Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Ctrl+C received");
            shutdown.trigger();
        }
        _ = shutdown.wait() => {}
    }
    Ok(())
}
