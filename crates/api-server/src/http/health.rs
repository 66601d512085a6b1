use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::llm::MISSING_API_KEY_MESSAGE;
use shared::models::OkResponse;
use tracing::warn;

use super::AppState;
use super::errors::error_response;

pub(super) async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

/// Ready once a language-model agent is configured.
pub(super) async fn readyz(State(state): State<AppState>) -> Response {
    if state.agent.is_some() {
        return (StatusCode::OK, Json(OkResponse { ok: true })).into_response();
    }

    warn!("readiness check failed: groq api key is not configured");
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "missing_api_key",
        MISSING_API_KEY_MESSAGE,
    )
}
