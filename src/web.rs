//! Read-only HTTP surface serving the current overlay view to a browser source.

use crate::view::OverlayView;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tokio::sync::watch;

pub type AppState = watch::Receiver<OverlayView>;

/// Creates the Axum router with the status endpoints.
pub fn create_router(view_rx: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/health", get(get_health))
        .with_state(view_rx)
}

/// Handler returning the latest overlay view.
async fn get_status(State(view_rx): State<AppState>) -> axum::response::Response {
    let view = view_rx.borrow().clone();
    (StatusCode::OK, Json(view)).into_response()
}

/// Liveness plus whether the last poll succeeded.
async fn get_health(State(view_rx): State<AppState>) -> axum::response::Response {
    let view = view_rx.borrow();
    let body = serde_json::json!({
        "ok": !view.error,
        "status": view.status,
        "updated_at": view.updated_at,
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// Bind and serve until the shutdown signal flips to `true`.
pub async fn serve(bind: &str, view_rx: AppState, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Overlay API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_router(view_rx))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
