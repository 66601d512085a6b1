use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::BackendSelection;
use crate::connection_cache::ConnectionCache;
use crate::database::{DatabaseConnector, DatabaseError, SqlDatabase};

pub const GREETING: &str = "How can I help you?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: MessageRole,
    pub content: String,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered chat transcript. Never empty: it starts from, and resets to, the greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<SessionMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            messages: vec![SessionMessage::assistant(GREETING)],
        }
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(SessionMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(SessionMessage::assistant(content));
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(SessionMessage::assistant(GREETING));
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one chat session owns: transcript, backend choice and its cached connection.
pub struct SessionContext {
    id: Uuid,
    created_at: DateTime<Utc>,
    log: MessageLog,
    backend: BackendSelection,
    connections: ConnectionCache<dyn SqlDatabase>,
}

impl SessionContext {
    pub fn new(id: Uuid, connection_ttl: Duration) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            log: MessageLog::new(),
            backend: BackendSelection::Local,
            connections: ConnectionCache::new(connection_ttl),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    pub fn backend(&self) -> &BackendSelection {
        &self.backend
    }

    /// Replaces the backend choice. The cached connection is rebuilt lazily on the
    /// next query because the cache is keyed by the selection.
    pub fn set_backend(&mut self, selection: BackendSelection) {
        self.backend = selection;
    }

    pub fn clear_history(&mut self) {
        self.log.reset();
    }

    pub async fn connection(
        &mut self,
        connector: &dyn DatabaseConnector,
    ) -> Result<Arc<dyn SqlDatabase>, DatabaseError> {
        let selection = &self.backend;
        self.connections
            .get_or_connect(selection, || connector.connect(selection))
            .await
    }
}
