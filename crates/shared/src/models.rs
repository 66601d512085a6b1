use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentEvent;
use crate::backend::{BackendKind, BackendSelection};
use crate::session::{SessionContext, SessionMessage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Backend selection as shown back to the client. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSummary {
    pub kind: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl From<&BackendSelection> for BackendSummary {
    fn from(selection: &BackendSelection) -> Self {
        match selection {
            BackendSelection::Local => Self {
                kind: BackendKind::Local,
                host: None,
                user: None,
                database: None,
            },
            BackendSelection::Remote(remote) => Self {
                kind: BackendKind::Remote,
                host: Some(remote.host.clone()),
                user: Some(remote.user.clone()),
                database: Some(remote.database.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub backend: BackendSummary,
    pub messages: Vec<SessionMessage>,
}

impl From<&SessionContext> for SessionResponse {
    fn from(session: &SessionContext) -> Self {
        Self {
            session_id: session.id(),
            created_at: session.created_at(),
            backend: BackendSummary::from(session.backend()),
            messages: session.log().messages().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub events: Vec<AgentEvent>,
    pub messages: Vec<SessionMessage>,
}
