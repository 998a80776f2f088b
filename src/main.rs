mod config;
mod game;
mod matchmaker;
mod protocol;
mod server;
mod state;

use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

use crate::server::{http, ws};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state = Arc::new(AppState::new());

    // Liveness sweep for every connected peer
    tokio::spawn(ws::keepalive_loop(state.clone()));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(http::routes())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config::server_port());
    info!("pong server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
