//! Liveness endpoint for hosting platforms that probe a port.

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Every path and method answers `200 OK`.
pub fn router() -> Router {
    Router::new().fallback(|| async { "OK" })
}

pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health endpoint listening");
    serve_on(listener, shutdown).await
}

async fn serve_on(listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
