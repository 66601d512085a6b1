use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};
use uuid::Uuid;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const MAX_REQUEST_ID_LEN: usize = 128;

/// Per-request correlation data, available to handlers as an `Extension`.
#[derive(Clone, Debug)]
pub(super) struct RequestContext {
    pub(super) request_id: String,
}

pub(super) async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let request_id = resolve_request_id(&req);
    req.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let started_at = Instant::now();

    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, header_value);
    }

    let status = response.status().as_u16();
    let latency_ms = started_at.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            route = %route,
            status,
            latency_ms,
            "request failed upstream"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            route = %route,
            status,
            latency_ms,
            "request completed"
        );
    }

    response
}

fn resolve_request_id(req: &Request) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn normalize_request_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_REQUEST_ID_LEN {
        return None;
    }

    trimmed
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'))
        .then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::extract::Request;
    use uuid::Uuid;

    use super::{normalize_request_id, resolve_request_id};

    #[test]
    fn normalizes_valid_request_ids() {
        assert_eq!(
            normalize_request_id(" chat-123._abc "),
            Some("chat-123._abc".to_string())
        );
    }

    #[test]
    fn rejects_invalid_request_ids() {
        assert!(normalize_request_id("").is_none());
        assert!(normalize_request_id("abc$123").is_none());
        assert!(normalize_request_id(&"x".repeat(129)).is_none());
    }

    #[test]
    fn client_request_id_is_propagated_or_replaced() {
        let propagated = Request::builder()
            .uri("/healthz")
            .header("x-request-id", "client-7")
            .body(Body::empty())
            .expect("request builder should work");
        assert_eq!(resolve_request_id(&propagated), "client-7");

        let invalid = Request::builder()
            .uri("/healthz")
            .header("x-request-id", "not valid!")
            .body(Body::empty())
            .expect("request builder should work");
        let generated = resolve_request_id(&invalid);
        assert!(Uuid::parse_str(&generated).is_ok());
    }
}
