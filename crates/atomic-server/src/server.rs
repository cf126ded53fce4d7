//! HTTP server lifecycle management.
//!
//! Provides [`run`] which prepares stores, serves requests until Ctrl-C or
//! SIGTERM, and then tears the harness down: rollback of any open scope
//! followed by closing every connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::AppConfig;
use crate::router::build_router;
use crate::startup::{self, StartupError};
use crate::state::AppState;

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),

    /// Stores or the harness could not be prepared.
    #[error("startup error: {0}")]
    Startup(#[from] StartupError),
}

/// Prepare state, serve on `addr` until a shutdown signal, then tear down.
///
/// # Errors
///
/// Returns an error if startup fails, the listener cannot bind, or the
/// server hits a fatal I/O error. Teardown runs in the last two cases.
pub async fn run(config: &AppConfig, addr: SocketAddr) -> Result<(), ServerError> {
    let state = startup::prepare(config).await?;

    let result = serve(addr, Arc::clone(&state), shutdown_signal()).await;

    info!("Shutting down atomic server");
    startup::teardown(&state).await;
    result
}

/// Serve the router on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot bind, or
/// [`ServerError::Serve`] on a fatal serve error.
pub async fn serve<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "Starting atomic server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
