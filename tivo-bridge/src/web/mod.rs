//! HTTP bridge exposing devices and their commands.

pub mod api;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use state::WebBridge;

/// Build the API router.
pub fn router(bridge: Arc<WebBridge>) -> Router {
    Router::new()
        .route("/api/devices", get(api::get_devices))
        .route("/api/devices/:device", get(api::get_device))
        .route("/api/devices/:device/command", post(api::post_command))
        .route("/api/devices/:device/tune", post(api::post_tune))
        .route("/api/devices/:device/lines", get(api::get_lines))
        .route("/api/devices/:device/events", get(api::get_events))
        .with_state(bridge)
        .layer(CorsLayer::permissive())
}

/// Start the web server.
pub async fn start_web_server(
    listen_addr: SocketAddr,
    bridge: Arc<WebBridge>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Web bridge listening on http://{}", listen_addr);

    axum::serve(listener, router(bridge)).await?;

    Ok(())
}
