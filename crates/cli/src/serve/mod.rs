//! `caseflow serve` -- HTTP JSON transport for the stage transition engine.
//!
//! Callers authenticate with `Authorization: Bearer <token>`; tokens are
//! mapped to principals from the `[[principals]]` config section. A missing
//! or unknown token is not rejected here: the engine answers
//! `unauthenticated` before touching storage.
//!
//! Endpoints:
//! - GET  /health               - Server status
//! - POST /transition           - Advance a case to its next stage
//! - POST /unfreeze             - Clear the freeze marker on a task
//! - GET  /flags                - Full feature flag document
//! - GET  /flags/{name}         - Current value of one flag
//! - PUT  /flags/{name}         - Set a flag: `{"value": bool}`
//! - GET  /freezes              - Pending freeze intents
//! - POST /freezes/drain        - Drain every pending freeze intent
//! - POST /freezes/{id}/retry   - Re-run one freeze intent
//!
//! Errors are `{"error": {"code": ..., "message": ...}}` with status
//! 400/401/404/409/412/500 by code.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use caseflow_engine::{SystemClock, TracingAuditSink, TransitionEngine};
use caseflow_storage::{MemoryStore, SeedData};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::handlers::{
    handle_drain_freezes, handle_get_flag, handle_health, handle_list_flags, handle_not_found,
    handle_pending_freezes, handle_retry_freeze, handle_set_flag, handle_transition,
    handle_unfreeze,
};
use self::middleware::principal_middleware;
use self::state::AppState;
use crate::config::Config;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/transition", post(handle_transition))
        .route("/unfreeze", post(handle_unfreeze))
        .route("/flags", get(handle_list_flags))
        .route("/flags/{name}", get(handle_get_flag).put(handle_set_flag))
        .route("/freezes", get(handle_pending_freezes))
        .route("/freezes/drain", post(handle_drain_freezes))
        .route("/freezes/{id}/retry", post(handle_retry_freeze))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            principal_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Build the engine over an in-memory store and serve until Ctrl+C.
pub(crate) async fn start_server(
    config: Config,
    seed: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = match &seed {
        Some(path) => {
            let data = SeedData::from_path(path)?;
            tracing::info!(
                path = %path.display(),
                cases = data.cases.len(),
                tasks = data.tasks.len(),
                "loaded seed data"
            );
            MemoryStore::from_seed(data)?
        }
        None => MemoryStore::new(),
    };

    let engine = TransitionEngine::from_config(
        Arc::new(store),
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
        &config.engine_config(),
    );
    let principals = config.principal_resolver();
    if principals.is_empty() {
        tracing::warn!("no principals configured; every engine call will be unauthenticated");
    }

    let state = Arc::new(AppState { engine, principals });
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "caseflow listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(e) => {
            tracing::error!(error = %e, "could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
