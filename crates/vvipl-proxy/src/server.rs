//! Proxy server lifecycle.

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::router::router;
use crate::state::ProxyState;

/// Serves the proxy on `listener` until Ctrl-C is received.
///
/// # Errors
///
/// Returns an error if the listener address cannot be read or the server
/// fails while running.
pub async fn serve(listener: TcpListener, state: ProxyState) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    tracing::info!(%addr, "IPL proxy listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("proxy server failed")?;

    tracing::info!("IPL proxy stopped");
    Ok(())
}

/// Resolves when Ctrl-C is received. Never resolves if the handler
/// cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C received, shutting down");
}
