use axum::{routing::get, Router};

use crate::state::SharedState;

/// Liveness probes served beside the game socket.
pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
}

async fn root() -> &'static str {
    "pong-server-ok"
}

async fn healthz() -> &'static str {
    "ok"
}
