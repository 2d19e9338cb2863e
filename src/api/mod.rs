//! HTTP API and WebSocket server, consumed by the UI.
//!
//! `spawn_api_server` builds an axum `Router` (Tower-http CORS/trace
//! layers, optional bearer-auth middleware) over the endpoint set: state
//! snapshot, metrics history, alert lifecycle and configuration, and the
//! `/ws` event stream.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::config::ApiConfig;

/// Spawn the API server in a background task, returning the address it
/// bound to.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let bind_addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    info!(addr = %bind_addr, "starting API server");

    let mut app = Router::new()
        .route("/api/state", get(routes::state::get_state))
        .route("/api/metrics/history/:kind/:id", get(routes::history::get_history))
        .route("/api/alerts", get(routes::alerts::list_alerts))
        .route("/api/alerts/:id/acknowledge", post(routes::alerts::acknowledge_alert))
        .route("/api/alerts/suppress", post(routes::alerts::suppress_alert))
        .route(
            "/api/alerts/config",
            get(routes::alerts::get_alert_config).put(routes::alerts::put_alert_config),
        )
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token {
        app = app.layer(axum::middleware::from_fn_with_state(token, middleware::auth::auth_middleware));
    }

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "API server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    Ok(addr)
}
