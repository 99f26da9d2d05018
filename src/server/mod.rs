pub mod routes;
pub mod ws;

use crate::state::AppState;
use std::sync::Arc;

/// Read-only snapshot API. Everything is served from the watch channel and
/// the broadcast stream, never from the refresh loop directly.
pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/api/snapshot", axum::routing::get(routes::get_snapshot))
        .route("/api/counters", axum::routing::get(routes::get_counters))
        .route("/ws", axum::routing::get(ws::ws_handler))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: Arc<AppState>, port: u16) {
    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("bind error on {addr}: {e}");
            return;
        }
    };
    tracing::info!("snapshot api listening on {addr}");

    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!("server error: {e}");
    }
}
