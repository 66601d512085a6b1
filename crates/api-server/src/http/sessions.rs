use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::backend::BackendForm;
use shared::models::{OkResponse, SessionResponse};
use tracing::info;
use uuid::Uuid;

use super::errors::{
    invalid_request_response, selection_error_response, session_not_found_response,
};
use super::{AppState, SharedSession};

pub(super) async fn create_session(State(state): State<AppState>) -> Response {
    let session = state.sessions.create();
    let session = session.lock().await;
    (StatusCode::OK, Json(SessionResponse::from(&*session))).into_response()
}

pub(super) async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = lookup_session(&state, &session_id) else {
        return session_not_found_response();
    };

    let session = session.lock().await;
    (StatusCode::OK, Json(SessionResponse::from(&*session))).into_response()
}

pub(super) async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Ok(session_id) = Uuid::parse_str(&session_id) else {
        return session_not_found_response();
    };

    if state.sessions.remove(session_id) {
        (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
    } else {
        session_not_found_response()
    }
}

pub(super) async fn update_backend(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    form: Result<Json<BackendForm>, JsonRejection>,
) -> Response {
    let Some(session) = lookup_session(&state, &session_id) else {
        return session_not_found_response();
    };
    let Json(form) = match form {
        Ok(form) => form,
        Err(rejection) => return invalid_request_response(&rejection),
    };

    let selection = match form.into_selection() {
        Ok(selection) => selection,
        Err(err) => return selection_error_response(err),
    };

    let mut session = session.lock().await;
    info!(
        session_id = %session.id(),
        backend = selection.kind().as_str(),
        "backend selection updated"
    );
    session.set_backend(selection);
    (StatusCode::OK, Json(SessionResponse::from(&*session))).into_response()
}

pub(super) async fn clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = lookup_session(&state, &session_id) else {
        return session_not_found_response();
    };

    let mut session = session.lock().await;
    session.clear_history();
    info!(session_id = %session.id(), "chat history cleared");
    (StatusCode::OK, Json(SessionResponse::from(&*session))).into_response()
}

pub(super) fn lookup_session(state: &AppState, raw_session_id: &str) -> Option<SharedSession> {
    let session_id = Uuid::parse_str(raw_session_id).ok()?;
    state.sessions.get(session_id)
}
