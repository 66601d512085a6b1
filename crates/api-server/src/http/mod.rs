use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Router, middleware};
use shared::agent::SqlAgent;
use shared::database::DatabaseConnector;

mod errors;
mod health;
mod observability;
mod query;
mod session_registry;
mod sessions;

pub use session_registry::{SessionRegistry, SharedSession};

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    /// `None` when no Groq API key is configured; every query is then refused.
    pub agent: Option<Arc<dyn SqlAgent>>,
    pub connector: Arc<dyn DatabaseConnector>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/v1/sessions", post(sessions::create_session))
        .route(
            "/v1/sessions/{session_id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/v1/sessions/{session_id}/backend",
            put(sessions::update_backend),
        )
        .route(
            "/v1/sessions/{session_id}/history/clear",
            post(sessions::clear_history),
        )
        .route(
            "/v1/sessions/{session_id}/messages",
            post(query::post_message),
        )
        .route(
            "/v1/sessions/{session_id}/messages/stream",
            post(query::stream_message),
        )
        .layer(middleware::from_fn(
            observability::request_context_middleware,
        ))
        .with_state(app_state)
}
