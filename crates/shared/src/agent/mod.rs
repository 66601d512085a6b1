//! Question → SQL → answer pipeline.
//!
//! [`SqlAgent`] is the single capability the dispatcher depends on. Intermediate
//! reasoning is reported through a [`ProgressSink`] while the run is in flight.

mod prompts;
mod react;
mod step;
mod tools;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::database::SqlDatabase;
use crate::llm::LlmGatewayError;
use crate::session::SessionMessage;

pub use react::{ITERATION_LIMIT_ANSWER, ReactSqlAgent, ReactSqlAgentConfig};
pub use step::{AgentStep, StepParseError, parse_step};
pub use tools::SqlTool;

pub type AgentFuture<'a> = Pin<Box<dyn Future<Output = Result<String, AgentError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thought { text: String },
    ToolCall { tool: String, input: String },
    Observation { tool: String, output: String },
}

impl AgentEvent {
    /// Server-sent event name for this progress event.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool",
            Self::Observation { .. } => "observation",
        }
    }
}

/// Side channel for progress events. Emitting never fails; events sent after the
/// receiver is gone are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<UnboundedSender<AgentEvent>>,
}

impl ProgressSink {
    pub fn discard() -> Self {
        Self { sender: None }
    }

    pub fn channel() -> (Self, UnboundedReceiver<AgentEvent>) {
        let (sender, receiver) = unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

pub struct AgentRequest<'a> {
    pub question: &'a str,
    /// Transcript preceding the question.
    pub history: &'a [SessionMessage],
    pub database: Arc<dyn SqlDatabase>,
    pub progress: ProgressSink,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Gateway(#[from] LlmGatewayError),
}

pub trait SqlAgent: Send + Sync {
    fn answer<'a>(&'a self, request: AgentRequest<'a>) -> AgentFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::{AgentEvent, ProgressSink};

    #[test]
    fn event_names_match_stream_vocabulary() {
        let thought = AgentEvent::Thought {
            text: "look at the tables".to_string(),
        };
        let tool = AgentEvent::ToolCall {
            tool: "sql_db_list_tables".to_string(),
            input: String::new(),
        };
        let observation = AgentEvent::Observation {
            tool: "sql_db_list_tables".to_string(),
            output: "STUDENT".to_string(),
        };

        assert_eq!(thought.event_name(), "thought");
        assert_eq!(tool.event_name(), "tool");
        assert_eq!(observation.event_name(), "observation");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let value = serde_json::to_value(AgentEvent::ToolCall {
            tool: "sql_db_query".to_string(),
            input: "SELECT 1".to_string(),
        })
        .expect("event serializes");

        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["tool"], "sql_db_query");
        assert_eq!(value["input"], "SELECT 1");
    }

    #[test]
    fn channel_sink_delivers_and_discard_sink_drops() {
        let (sink, mut receiver) = ProgressSink::channel();
        sink.emit(AgentEvent::Thought {
            text: "first".to_string(),
        });
        assert_eq!(
            receiver.try_recv().expect("event delivered"),
            AgentEvent::Thought {
                text: "first".to_string()
            }
        );

        ProgressSink::discard().emit(AgentEvent::Thought {
            text: "ignored".to_string(),
        });

        drop(receiver);
        sink.emit(AgentEvent::Thought {
            text: "after close".to_string(),
        });
    }
}
