//! HTTP API for the Car Wash Mixer.
//!
//! Exposes `POST /mix`, `POST /map-lyrics` and `GET /health`, plus the
//! static `GET /openapi.json`, `GET /.well-known/ai-plugin.json` and
//! `GET /privacy` documents. [`build_router`] is public so the routes can be
//! exercised in-process by tests.

pub mod error;
pub mod handlers;
pub mod openapi;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use carwash_core::{cache, CacheGateway, MixerError, ServiceConfig};
use tokio::signal;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info};

pub use error::{ApiError, ApiResult};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn CacheGateway>,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(cache: Arc<dyn CacheGateway>, cache_ttl: Duration) -> Self {
        Self {
            cache,
            cache_ttl,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            cache: cache::build_gateway(&config.cache),
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        }
    }
}

/// Builds the application router with compression, timeout, tracing and
/// CORS layers applied.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.request_timeout;

    Router::new()
        .route("/mix", post(handlers::mix))
        .route("/map-lyrics", post(handlers::map_lyrics))
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(openapi::document))
        .route("/.well-known/ai-plugin.json", get(openapi::plugin_manifest))
        .route("/privacy", get(openapi::privacy_policy))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds the configured address and serves until Ctrl+C or SIGTERM.
pub async fn serve(config: ServiceConfig) -> carwash_core::Result<()> {
    let state = AppState::from_config(&config);
    let app = build_router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        %addr,
        cache = ?config.cache.backend,
        ttl_secs = config.cache.ttl_secs,
        "starting HTTP server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(MixerError::from)?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
