use thiserror::Error;
use tracing::{info, warn};

use crate::agent::{AgentError, AgentRequest, ProgressSink, SqlAgent};
use crate::database::{DatabaseConnector, DatabaseError};
use crate::llm::MISSING_API_KEY_MESSAGE;
use crate::session::SessionContext;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("{}", MISSING_API_KEY_MESSAGE)]
    MissingApiKey,
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Runs one chat turn against the session's current backend.
///
/// Checks happen before any side effect: an empty query or a missing agent
/// credential leaves the transcript and the connection cache untouched. Once the
/// connection is live the user message is appended; the assistant reply is
/// appended only when the agent succeeds.
pub async fn dispatch_query(
    session: &mut SessionContext,
    query: &str,
    agent: Option<&dyn SqlAgent>,
    connector: &dyn DatabaseConnector,
    progress: ProgressSink,
) -> Result<String, DispatchError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(DispatchError::EmptyQuery);
    }

    let Some(agent) = agent else {
        warn!(session_id = %session.id(), "query refused: groq api key is not configured");
        return Err(DispatchError::MissingApiKey);
    };

    let database = session.connection(connector).await?;

    session.log_mut().push_user(query);
    let history_len = session.log().len() - 1;
    let answer = agent
        .answer(AgentRequest {
            question: query,
            history: &session.log().messages()[..history_len],
            database,
            progress,
        })
        .await?;

    session.log_mut().push_assistant(answer.clone());
    info!(
        session_id = %session.id(),
        backend = session.backend().kind().as_str(),
        messages = session.log().len(),
        "query answered"
    );

    Ok(answer)
}
