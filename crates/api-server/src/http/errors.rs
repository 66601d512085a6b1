use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::backend::SelectionError;
use shared::dispatcher::DispatchError;
use shared::models::{ErrorBody, ErrorResponse};
use tracing::{error, warn};

pub(super) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

pub(super) fn bad_request_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

pub(super) const INVALID_REQUEST_CODE: &str = "invalid_request";

pub(super) fn invalid_request_response(rejection: &JsonRejection) -> Response {
    warn!(status = %rejection.status(), "request body rejected: {}", rejection.body_text());
    bad_request_response(INVALID_REQUEST_CODE, &rejection.body_text())
}

pub(super) fn session_not_found_response() -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", "Session not found")
}

pub(super) fn selection_error_response(err: SelectionError) -> Response {
    match &err {
        SelectionError::IncompleteRemote { missing } => {
            warn!(?missing, "remote backend form is incomplete");
        }
    }
    bad_request_response("incomplete_connection", &err.to_string())
}

/// Maps a failed chat turn to its `(status, code)` pair.
pub(super) fn dispatch_error_status(err: &DispatchError) -> (StatusCode, &'static str) {
    match err {
        DispatchError::EmptyQuery => (StatusCode::BAD_REQUEST, "invalid_query"),
        DispatchError::MissingApiKey => (StatusCode::SERVICE_UNAVAILABLE, "missing_api_key"),
        DispatchError::Database(_) => (StatusCode::BAD_GATEWAY, "database_unavailable"),
        DispatchError::Agent(_) => (StatusCode::BAD_GATEWAY, "agent_failed"),
    }
}

pub(super) fn dispatch_error_response(err: DispatchError) -> Response {
    let (status, code) = dispatch_error_status(&err);
    if status.is_server_error() {
        error!(code, "chat turn failed: {err}");
    }
    error_response(status, code, &err.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use shared::database::DatabaseError;
    use shared::dispatcher::DispatchError;

    use super::dispatch_error_status;

    #[test]
    fn dispatch_errors_map_to_documented_codes() {
        assert_eq!(
            dispatch_error_status(&DispatchError::EmptyQuery),
            (StatusCode::BAD_REQUEST, "invalid_query")
        );
        assert_eq!(
            dispatch_error_status(&DispatchError::MissingApiKey),
            (StatusCode::SERVICE_UNAVAILABLE, "missing_api_key")
        );
        assert_eq!(
            dispatch_error_status(&DispatchError::Database(
                DatabaseError::InvalidConnection("bad host".to_string())
            )),
            (StatusCode::BAD_GATEWAY, "database_unavailable")
        );
    }
}
