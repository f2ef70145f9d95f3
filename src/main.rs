mod error;
mod handlers;
mod session;
mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use log::info;
use tower_http::cors::CorsLayer;

use handlers::AppState;
use session::{GatewayConfig, LogObserver};

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/send-message", post(handlers::send_message))
        .route("/webhook", post(handlers::inbound_webhook))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init_timed();

    let gateway_url = std::env::var("WPP_GATEWAY_URL")
        .unwrap_or_else(|_| "http://localhost:21465".to_string());
    let session_id =
        std::env::var("WPP_SESSION").unwrap_or_else(|_| "mySessionName".to_string());
    let token = std::env::var("WPP_GATEWAY_TOKEN").ok();
    let port: u16 = std::env::var("WPP_API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    info!("Gateway: {}", gateway_url);
    info!("Session: {}", session_id);
    info!("Establishing session...");

    // Phase 1: pair and connect. A failure here is fatal; the listener is
    // never bound without a ready session.
    let handle = session::establish(
        GatewayConfig {
            base_url: gateway_url,
            session_id,
            token,
        },
        |payload| {
            info!("Scan the QR code below:");
            match session::render_qr(payload) {
                Some(ascii) => println!("{}", ascii),
                None => info!("QR payload: {}", payload),
            }
        },
        |status| info!("Status Session: {}", status),
    )
    .await?;

    info!("Client is logged in!");

    // Phase 2: store the handle (written exactly once) and expose the API.
    let state = Arc::new(AppState::ready(handle, Arc::new(LogObserver)));

    let addr = format!("0.0.0.0:{}", port);
    info!("API server listening at http://localhost:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
