pub mod accounts;
pub mod error;
pub mod mailbox;
pub mod middleware;
pub mod notify;
pub mod pairing;
pub mod session;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use beam_db::Database;
use beam_types::api::HealthResponse;

use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::notify::Notifier;

/// 5 MiB, the upload cap clients were built against.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Room for multipart boundaries and part headers on top of the payload.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub notifier: Arc<dyn Notifier>,
    pub max_upload_bytes: usize,
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;

    let public_routes = Router::new()
        .route("/register", post(accounts::register))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/props", post(accounts::set_props))
        .route("/connect", post(pairing::connect))
        .route("/accept", post(pairing::accept))
        .route("/disconnect", post(pairing::disconnect))
        .route("/query", get(pairing::query).post(pairing::query))
        .route(
            "/set",
            post(mailbox::set_payload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/get", get(mailbox::get_payload))
        .route("/clear", post(mailbox::clear_payload))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
}
