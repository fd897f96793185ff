//! Axum-based HTTP server exposing the cache over a small JSON API.
//!
//! The storage core is synchronous; the server wraps a single [`Cache`] in a
//! mutex and is the only async layer in the crate. Handlers never hold the
//! lock across an await point.
//!
//! # Endpoints
//!
//! - `GET /health`: storage and license checks.
//! - `POST /v1/cache`: store a prompt/response pair.
//! - `GET /v1/cache/:hash`: fetch one entry by hash (counts as a hit).
//! - `DELETE /v1/cache/:hash`: remove one entry.
//! - `GET /v1/stats`: aggregate statistics.
//! - `GET /v1/search`: rank cached prompts against a free-text query.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;

use crate::cache::Cache;
use crate::config::AppConfig;
use crate::error::{Result, StoreError};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cache: Arc<Mutex<Cache>>,
}

/// Create request ID layers for the application
fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::x_request_id(MakeRequestUuid),
        PropagateRequestIdLayer::x_request_id(),
    )
}

pub fn create_router(config: AppConfig, cache: Cache) -> Router {
    let state = AppState {
        config,
        cache: Arc::new(Mutex::new(cache)),
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/v1/cache", post(handlers::set_handler))
        .route(
            "/v1/cache/:hash",
            get(handlers::get_handler).delete(handlers::delete_handler),
        )
        .route("/v1/stats", get(handlers::stats_handler))
        .route("/v1/search", get(handlers::search_handler))
        // Free-tier responses cap at 100KB; 10MB leaves headroom for PRO payloads
        .layer(tower_http::limit::RequestBodyLimitLayer::new(10 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}

/// Bind and run the server until Ctrl+C or SIGTERM.
pub async fn serve(cache: Cache, config: AppConfig, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| StoreError::Config(format!("invalid listen address {host}:{port}: {e}")))?;

    let app = create_router(config, cache);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
