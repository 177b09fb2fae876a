//! Web server: SSE change stream, line catalog, static assets.
//!
//! Shared state holds the broadcaster (the only state shared with the
//! tracker) and the immutable line catalog.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use transit_core::LineCatalog;

use crate::broadcast::Broadcaster;

pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub hub: Broadcaster,
    pub catalog: Arc<LineCatalog>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/events", get(routes::events))
        .route("/api/lines", get(routes::api_lines))
        .route("/healthz", get(routes::healthz))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(cors)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(
    state: Arc<AppState>,
    static_dir: Option<PathBuf>,
    addr: String,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state, static_dir);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(address = %listener.local_addr()?, "starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
