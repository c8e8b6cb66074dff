//! HTTP API server.
//!
//! JSON endpoints for discovering the device's port, connecting, and sending
//! commands. Built on Axum; versioned routes live under `/api/v1`.

pub mod v1;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{error::Result, tracing::prelude::*, transport::SerialBackend};

pub use v1::AppState;

/// Build the full router.
pub fn router<B: SerialBackend>(state: AppState<B>) -> Router {
    Router::new()
        .nest("/api/v1", v1::routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `listen` until `running` is cancelled.
pub async fn serve<B: SerialBackend>(
    listen: &str,
    state: AppState<B>,
    running: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { running.cancelled().await })
        .await?;

    debug!("API server stopped");
    Ok(())
}
