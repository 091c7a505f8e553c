//! OS signal handling.
//!
//! Ctrl+C (SIGINT) triggers graceful shutdown; there is no reload signal since
//! configuration is fixed for the life of the process.

use crate::lifecycle::Shutdown;

/// Wait for Ctrl+C, then fire the shutdown broadcast.
pub async fn shutdown_on_ctrl_c(shutdown: Shutdown) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl+C received, shutting down");
            shutdown.trigger();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    }
}
