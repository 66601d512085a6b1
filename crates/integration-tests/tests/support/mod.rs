#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_server::http::{AppState, SessionRegistry, build_router};
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use shared::agent::{ReactSqlAgent, ReactSqlAgentConfig, SqlAgent};
use shared::backend::BackendSelection;
use shared::database::{DatabaseConnector, DatabaseError, DatabaseFuture, SqlDatabase, SqlDialect};
use shared::llm::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
};
use tower::ServiceExt;

pub const REMOTE_UNREACHABLE: &str = "Can't connect to MySQL server on 'db.invalid'";

pub struct TestApp {
    pub router: axum::Router,
    pub connector: Arc<CountingConnector>,
}

/// Router wired with a counting connector. `agent_replies` scripts the model;
/// `None` simulates a missing API key.
pub fn build_test_app(agent_replies: Option<Vec<ScriptedReply>>) -> TestApp {
    let connector = Arc::new(CountingConnector::default());
    let agent = agent_replies.map(|replies| {
        let gateway = Arc::new(ScriptedGateway::new(replies));
        Arc::new(ReactSqlAgent::new(gateway, ReactSqlAgentConfig::default())) as Arc<dyn SqlAgent>
    });

    let router = build_router(AppState {
        sessions: SessionRegistry::new(Duration::from_secs(7200), Duration::from_secs(3600)),
        agent,
        connector: connector.clone(),
    });

    TestApp { router, connector }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Content(String),
    ProviderError,
}

impl ScriptedReply {
    pub fn content(value: impl Into<String>) -> Self {
        Self::Content(value.into())
    }
}

/// Model turns for one "how many students" question.
pub fn student_count_turn() -> Vec<ScriptedReply> {
    vec![
        ScriptedReply::content(
            r#"{"thought":"I should look at the tables","action":"sql_db_list_tables","action_input":""}"#,
        ),
        ScriptedReply::content(
            r#"{"thought":"Count the rows","action":"sql_db_query","action_input":"SELECT COUNT(*) FROM STUDENT"}"#,
        ),
        ScriptedReply::content(
            r#"{"thought":"I now know the final answer","final_answer":"There are 5 students."}"#,
        ),
    ]
}

pub struct ScriptedGateway {
    replies: Mutex<VecDeque<ScriptedReply>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
        }
    }
}

impl LlmGateway for ScriptedGateway {
    fn generate<'a>(&'a self, _request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        let reply = self
            .replies
            .lock()
            .expect("script mutex should not be poisoned")
            .pop_front();
        Box::pin(async move {
            match reply {
                Some(ScriptedReply::Content(content)) => Ok(LlmGatewayResponse {
                    model: "llama3-8b-8192".to_string(),
                    provider_request_id: None,
                    content,
                    usage: None,
                }),
                Some(ScriptedReply::ProviderError) | None => Err(
                    LlmGatewayError::ProviderFailure("status=500 code=unknown".to_string()),
                ),
            }
        })
    }
}

pub struct StudentDatabase;

impl SqlDatabase for StudentDatabase {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn list_tables(&self) -> DatabaseFuture<'_, Vec<String>> {
        Box::pin(async { Ok(vec!["STUDENT".to_string()]) })
    }

    fn table_info<'a>(&'a self, _tables: &'a [String]) -> DatabaseFuture<'a, String> {
        Box::pin(async { Ok("CREATE TABLE STUDENT(NAME VARCHAR(25), MARKS INT)".to_string()) })
    }

    fn run<'a>(&'a self, _sql: &'a str) -> DatabaseFuture<'a, String> {
        Box::pin(async { Ok("[(5,)]".to_string()) })
    }
}

/// Local selections connect to [`StudentDatabase`]; remote selections fail as an
/// unreachable server would.
#[derive(Default)]
pub struct CountingConnector {
    calls: AtomicUsize,
    selections: Mutex<Vec<BackendSelection>>,
}

impl CountingConnector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn selections(&self) -> Vec<BackendSelection> {
        self.selections
            .lock()
            .expect("selections mutex should not be poisoned")
            .clone()
    }
}

impl DatabaseConnector for CountingConnector {
    fn connect<'a>(
        &'a self,
        selection: &'a BackendSelection,
    ) -> DatabaseFuture<'a, Arc<dyn SqlDatabase>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.selections
            .lock()
            .expect("selections mutex should not be poisoned")
            .push(selection.clone());

        Box::pin(async move {
            match selection {
                BackendSelection::Local => Ok(Arc::new(StudentDatabase) as Arc<dyn SqlDatabase>),
                BackendSelection::Remote(_) => Err(DatabaseError::InvalidConnection(
                    REMOTE_UNREACHABLE.to_string(),
                )),
            }
        })
    }
}

pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

pub async fn send_json(app: &axum::Router, request: Request<Body>) -> JsonResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");
    let body = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));

    JsonResponse { status, body }
}

pub async fn send_text(app: &axum::Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");

    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn request(method: Method, path: &str, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::ACCEPT, "application/json");

    let request_body = body
        .map(|value| {
            serde_json::to_vec(&value).expect("json body should serialize for integration request")
        })
        .unwrap_or_default();
    if !request_body.is_empty() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }

    builder
        .body(Body::from(request_body))
        .expect("integration request should build")
}

pub async fn create_session(app: &axum::Router) -> String {
    let created = send_json(app, request(Method::POST, "/v1/sessions", None)).await;
    assert_eq!(created.status, StatusCode::OK);
    created.body["session_id"]
        .as_str()
        .expect("session id should be a string")
        .to_string()
}

pub fn error_code(body: &Value) -> Option<&str> {
    body.get("error")?.get("code")?.as_str()
}

pub fn error_message(body: &Value) -> Option<&str> {
    body.get("error")?.get("message")?.as_str()
}
