use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_core::stream::Stream;
use serde::Serialize;
use shared::agent::{AgentEvent, ProgressSink};
use shared::dispatcher::{DispatchError, dispatch_query};
use shared::models::{ErrorBody, ErrorResponse, QueryRequest, QueryResponse};
use shared::session::SessionMessage;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};

use super::errors::{
    INVALID_REQUEST_CODE, dispatch_error_response, dispatch_error_status,
    invalid_request_response, session_not_found_response,
};
use super::observability::RequestContext;
use super::sessions::lookup_session;
use super::{AppState, SharedSession};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub(super) async fn post_message(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Path(session_id): Path<String>,
    req: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Some(session) = lookup_session(&state, &session_id) else {
        return session_not_found_response();
    };
    let Json(req) = match req {
        Ok(req) => req,
        Err(rejection) => return invalid_request_response(&rejection),
    };

    let (progress, receiver) = ProgressSink::channel();
    match run_turn(&state, &session, &req.query, progress).await {
        Ok((answer, messages)) => {
            info!(request_id = %context.request_id, "chat turn answered");
            let response = QueryResponse {
                answer,
                events: drain_events(receiver),
                messages,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => dispatch_error_response(err),
    }
}

/// Same turn as [`post_message`], streamed as server-sent events: progress events
/// while the agent works, then a single `answer` or `error` event.
pub(super) async fn stream_message(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Path(session_id): Path<String>,
    req: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Some(session) = lookup_session(&state, &session_id) else {
        return session_not_found_response();
    };

    let (sender, receiver) = unbounded_channel::<SseEvent>();
    let req = match req {
        Ok(Json(req)) => req,
        Err(rejection) => {
            info!(
                request_id = %context.request_id,
                "streamed chat turn rejected: {}",
                rejection.body_text()
            );
            if let Some(event) = sse_error_event(INVALID_REQUEST_CODE, rejection.body_text()) {
                let _ = sender.send(event);
            }
            drop(sender);
            return sse_response(UnboundedReceiverStream::new(receiver)).into_response();
        }
    };

    tokio::spawn(async move {
        let (progress, progress_rx) = ProgressSink::channel();
        let forwarder = tokio::spawn(forward_progress(progress_rx, sender.clone()));

        let outcome = run_turn(&state, &session, &req.query, progress).await;
        let events = forwarder.await.unwrap_or_default();

        let final_event = match outcome {
            Ok((answer, messages)) => {
                info!(request_id = %context.request_id, "streamed chat turn answered");
                sse_json_event(
                    "answer",
                    &QueryResponse {
                        answer,
                        events,
                        messages,
                    },
                )
            }
            Err(err) => {
                let (status, code) = dispatch_error_status(&err);
                if status.is_server_error() {
                    error!(
                        request_id = %context.request_id,
                        code,
                        "streamed chat turn failed: {err}"
                    );
                }
                sse_error_event(code, err.to_string())
            }
        };

        if let Some(event) = final_event {
            let _ = sender.send(event);
        }
    });

    sse_response(UnboundedReceiverStream::new(receiver)).into_response()
}

async fn run_turn(
    state: &AppState,
    session: &SharedSession,
    query: &str,
    progress: ProgressSink,
) -> Result<(String, Vec<SessionMessage>), DispatchError> {
    let mut session = session.lock().await;
    let answer = dispatch_query(
        &mut session,
        query,
        state.agent.as_deref(),
        state.connector.as_ref(),
        progress,
    )
    .await?;
    Ok((answer, session.log().messages().to_vec()))
}

async fn forward_progress(
    mut progress: UnboundedReceiver<AgentEvent>,
    sender: UnboundedSender<SseEvent>,
) -> Vec<AgentEvent> {
    let mut seen = Vec::new();
    while let Some(event) = progress.recv().await {
        if let Some(sse_event) = sse_json_event(event.event_name(), &event) {
            let _ = sender.send(sse_event);
        }
        seen.push(event);
    }
    seen
}

fn drain_events(mut receiver: UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn sse_json_event<T: Serialize>(name: &'static str, payload: &T) -> Option<SseEvent> {
    match SseEvent::default().event(name).json_data(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            error!("failed to serialize {name} event: {err}");
            None
        }
    }
}

fn sse_error_event(code: &str, message: String) -> Option<SseEvent> {
    sse_json_event(
        "error",
        &ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        },
    )
}

fn sse_response(
    events: UnboundedReceiverStream<SseEvent>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = tokio_stream::StreamExt::map(events, Ok::<_, Infallible>);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
