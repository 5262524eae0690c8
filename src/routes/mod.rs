use axum::routing::get;
use axum::Router;

use crate::metrics;
use crate::state::AppState;
use crate::websocket::handlers;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics::scrape))
}

async fn health() -> &'static str {
    "ok"
}
