use std::sync::Arc;

use tracing::{debug, info, warn};

use super::prompts::{
    INVALID_FORMAT_OBSERVATION, observation_message, query_checker_prompt, system_prompt,
};
use super::step::{AgentStep, parse_step};
use super::tools::SqlTool;
use super::{AgentError, AgentEvent, AgentFuture, AgentRequest, SqlAgent};
use crate::database::{SqlDatabase, parse_table_list};
use crate::llm::{ChatMessage, LlmGateway, LlmGatewayRequest};
use crate::session::{MessageRole, SessionMessage};

pub const ITERATION_LIMIT_ANSWER: &str = "Agent stopped due to iteration limit or time limit.";

const DEFAULT_MAX_ITERATIONS: u32 = 15;
const DEFAULT_TOP_K: u32 = 10;
const DEFAULT_HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct ReactSqlAgentConfig {
    pub max_iterations: u32,
    pub top_k: u32,
    /// Number of most recent transcript messages replayed to the model.
    pub history_window: usize,
}

impl Default for ReactSqlAgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            top_k: DEFAULT_TOP_K,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

/// Zero-shot reason/act loop: the model picks a SQL tool per turn until it can
/// give a final answer or runs out of iterations.
#[derive(Clone)]
pub struct ReactSqlAgent {
    gateway: Arc<dyn LlmGateway>,
    config: ReactSqlAgentConfig,
}

impl ReactSqlAgent {
    pub fn new(gateway: Arc<dyn LlmGateway>, config: ReactSqlAgentConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> ReactSqlAgentConfig {
        self.config
    }

    async fn run(&self, request: AgentRequest<'_>) -> Result<String, AgentError> {
        let AgentRequest {
            question,
            history,
            database,
            progress,
        } = request;

        let mut messages = Vec::with_capacity(self.config.history_window + 2);
        messages.push(ChatMessage::system(system_prompt(
            database.dialect(),
            self.config.top_k,
        )));
        let window_start = history.len().saturating_sub(self.config.history_window);
        messages.extend(history[window_start..].iter().map(history_message));
        messages.push(ChatMessage::user(format!("Question: {question}")));

        for iteration in 0..self.config.max_iterations {
            let response = self
                .gateway
                .generate(LlmGatewayRequest::new(messages.clone()).json_object())
                .await?;
            let reply = response.content;

            let step = match parse_step(&reply) {
                Ok(step) => step,
                Err(err) => {
                    warn!(iteration, error = %err, "agent reply could not be parsed");
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(observation_message(
                        INVALID_FORMAT_OBSERVATION,
                    )));
                    continue;
                }
            };

            match step {
                AgentStep::Final { thought, answer } => {
                    if !thought.is_empty() {
                        progress.emit(AgentEvent::Thought { text: thought });
                    }
                    info!(iterations = iteration + 1, "agent produced final answer");
                    return Ok(answer);
                }
                AgentStep::Action {
                    thought,
                    tool,
                    input,
                } => {
                    if !thought.is_empty() {
                        progress.emit(AgentEvent::Thought { text: thought });
                    }
                    progress.emit(AgentEvent::ToolCall {
                        tool: tool.clone(),
                        input: input.clone(),
                    });
                    debug!(iteration, tool = %tool, "agent invoking tool");

                    let output = self.invoke_tool(&tool, &input, database.as_ref()).await?;
                    progress.emit(AgentEvent::Observation {
                        tool,
                        output: output.clone(),
                    });

                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(observation_message(&output)));
                }
            }
        }

        info!(
            max_iterations = self.config.max_iterations,
            "agent stopped at iteration limit"
        );
        Ok(ITERATION_LIMIT_ANSWER.to_string())
    }

    /// Tool failures become observations for the model; only gateway failures abort.
    async fn invoke_tool(
        &self,
        name: &str,
        input: &str,
        database: &dyn SqlDatabase,
    ) -> Result<String, AgentError> {
        let Some(tool) = SqlTool::from_name(name) else {
            return Ok(format!(
                "{name} is not a valid tool, try one of [{}].",
                SqlTool::names().join(", ")
            ));
        };

        let output = match tool {
            SqlTool::ListTables => database.list_tables().await.map(|tables| tables.join(", ")),
            SqlTool::Schema => {
                let tables = parse_table_list(input);
                database.table_info(&tables).await
            }
            SqlTool::Query => database.run(strip_sql_fences(input)).await,
            SqlTool::QueryChecker => {
                let prompt = query_checker_prompt(database.dialect(), strip_sql_fences(input));
                let response = self
                    .gateway
                    .generate(LlmGatewayRequest::new(vec![ChatMessage::user(prompt)]))
                    .await?;
                return Ok(strip_sql_fences(&response.content).to_string());
            }
        };

        Ok(output.unwrap_or_else(|err| format!("Error: {err}")))
    }
}

impl SqlAgent for ReactSqlAgent {
    fn answer<'a>(&'a self, request: AgentRequest<'a>) -> AgentFuture<'a> {
        Box::pin(self.run(request))
    }
}

fn history_message(message: &SessionMessage) -> ChatMessage {
    match message.role {
        MessageRole::User => ChatMessage::user(message.content.clone()),
        MessageRole::Assistant => ChatMessage::assistant(message.content.clone()),
    }
}

fn strip_sql_fences(input: &str) -> &str {
    let trimmed = input.trim();
    let without_open = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::{ITERATION_LIMIT_ANSWER, ReactSqlAgent, ReactSqlAgentConfig, strip_sql_fences};
    use crate::agent::{AgentError, AgentEvent, AgentRequest, ProgressSink, SqlAgent};
    use crate::database::{DatabaseError, DatabaseFuture, SqlDatabase, SqlDialect};
    use crate::llm::{
        ChatRole, LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest,
        LlmGatewayResponse, ResponseFormat,
    };
    use crate::session::SessionMessage;

    struct ScriptedGateway {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<LlmGatewayRequest>>,
    }

    impl ScriptedGateway {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(ToString::to_string).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<LlmGatewayRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    impl LlmGateway for ScriptedGateway {
        fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
            self.requests.lock().expect("requests lock").push(request);
            let reply = self.replies.lock().expect("replies lock").pop_front();
            Box::pin(async move {
                reply
                    .map(|content| LlmGatewayResponse {
                        model: "llama3-8b-8192".to_string(),
                        provider_request_id: None,
                        content,
                        usage: None,
                    })
                    .ok_or_else(|| LlmGatewayError::ProviderFailure("script_exhausted".to_string()))
            })
        }
    }

    #[derive(Default)]
    struct StudentDatabase {
        executed: Mutex<Vec<String>>,
    }

    impl SqlDatabase for StudentDatabase {
        fn dialect(&self) -> SqlDialect {
            SqlDialect::Sqlite
        }

        fn list_tables(&self) -> DatabaseFuture<'_, Vec<String>> {
            Box::pin(async { Ok(vec!["STUDENT".to_string()]) })
        }

        fn table_info<'a>(&'a self, tables: &'a [String]) -> DatabaseFuture<'a, String> {
            Box::pin(async move {
                if tables.iter().any(|table| table != "STUDENT") {
                    return Err(DatabaseError::UnknownTables(tables.to_vec()));
                }
                Ok("CREATE TABLE STUDENT(NAME VARCHAR(25))".to_string())
            })
        }

        fn run<'a>(&'a self, sql: &'a str) -> DatabaseFuture<'a, String> {
            self.executed
                .lock()
                .expect("executed lock")
                .push(sql.to_string());
            Box::pin(async { Ok("[(5,)]".to_string()) })
        }
    }

    fn request<'a>(
        question: &'a str,
        history: &'a [SessionMessage],
        database: Arc<StudentDatabase>,
        progress: ProgressSink,
    ) -> AgentRequest<'a> {
        AgentRequest {
            question,
            history,
            database,
            progress,
        }
    }

    #[tokio::test]
    async fn walks_tools_then_returns_final_answer() {
        let gateway = ScriptedGateway::new(&[
            r#"{"thought":"see tables","action":"sql_db_list_tables","action_input":""}"#,
            r#"{"thought":"check schema","action":"sql_db_schema","action_input":"STUDENT"}"#,
            r#"{"thought":"verify","action":"sql_db_query_checker","action_input":"SELECT COUNT(*) FROM STUDENT"}"#,
            "```sql\nSELECT COUNT(*) FROM STUDENT\n```",
            r#"{"thought":"run it","action":"sql_db_query","action_input":"SELECT COUNT(*) FROM STUDENT"}"#,
            r#"{"thought":"I now know the final answer","final_answer":"There are 5 students."}"#,
        ]);
        let database = Arc::new(StudentDatabase::default());
        let agent = ReactSqlAgent::new(gateway.clone(), ReactSqlAgentConfig::default());
        let (progress, mut events) = ProgressSink::channel();

        let answer = agent
            .answer(request(
                "How many students are there?",
                &[],
                database.clone(),
                progress,
            ))
            .await
            .expect("agent answers");

        assert_eq!(answer, "There are 5 students.");
        assert_eq!(
            database.executed.lock().expect("executed lock").as_slice(),
            ["SELECT COUNT(*) FROM STUDENT"]
        );

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 13);
        assert_eq!(
            received[1],
            AgentEvent::ToolCall {
                tool: "sql_db_list_tables".to_string(),
                input: String::new(),
            }
        );
        assert_eq!(
            received[2],
            AgentEvent::Observation {
                tool: "sql_db_list_tables".to_string(),
                output: "STUDENT".to_string(),
            }
        );
        assert_eq!(
            received[8],
            AgentEvent::Observation {
                tool: "sql_db_query_checker".to_string(),
                output: "SELECT COUNT(*) FROM STUDENT".to_string(),
            }
        );

        let requests = gateway.requests();
        assert_eq!(requests[0].response_format, ResponseFormat::JsonObject);
        assert_eq!(requests[3].response_format, ResponseFormat::Text);
        let last = requests.last().expect("final request");
        let last_message = last.messages.last().expect("observation message");
        assert_eq!(last_message.role, ChatRole::User);
        assert_eq!(last_message.content, "Observation: [(5,)]");
    }

    #[tokio::test]
    async fn unknown_tools_and_table_errors_are_reported_back_to_the_model() {
        let gateway = ScriptedGateway::new(&[
            r#"{"action":"python_repl","action_input":"print(1)"}"#,
            r#"{"action":"sql_db_schema","action_input":"ghost"}"#,
            r#"{"final_answer":"I don't know"}"#,
        ]);
        let agent = ReactSqlAgent::new(gateway.clone(), ReactSqlAgentConfig::default());

        let answer = agent
            .answer(request(
                "Who teaches maths?",
                &[],
                Arc::new(StudentDatabase::default()),
                ProgressSink::discard(),
            ))
            .await
            .expect("agent answers");
        assert_eq!(answer, "I don't know");

        let requests = gateway.requests();
        let invalid_tool = &requests[1].messages.last().expect("observation").content;
        assert!(invalid_tool.contains("python_repl is not a valid tool, try one of ["));
        let table_error = &requests[2].messages.last().expect("observation").content;
        assert!(table_error.starts_with("Observation: Error: "));
        assert!(table_error.contains("ghost"));
    }

    #[tokio::test]
    async fn unparseable_reply_is_fed_back_and_loop_continues() {
        let gateway = ScriptedGateway::new(&[
            "The answer is probably five.",
            r#"{"final_answer":"5"}"#,
        ]);
        let agent = ReactSqlAgent::new(gateway.clone(), ReactSqlAgentConfig::default());

        let answer = agent
            .answer(request(
                "How many students?",
                &[],
                Arc::new(StudentDatabase::default()),
                ProgressSink::discard(),
            ))
            .await
            .expect("agent answers");

        assert_eq!(answer, "5");
        let second = &gateway.requests()[1];
        let feedback = second.messages.last().expect("feedback");
        assert!(feedback.content.starts_with("Observation: Invalid Format"));
    }

    #[tokio::test]
    async fn stops_with_fixed_answer_at_iteration_limit() {
        let gateway = ScriptedGateway::new(&[
            r#"{"action":"sql_db_list_tables","action_input":""}"#,
            r#"{"action":"sql_db_list_tables","action_input":""}"#,
            r#"{"final_answer":"never reached"}"#,
        ]);
        let agent = ReactSqlAgent::new(
            gateway.clone(),
            ReactSqlAgentConfig {
                max_iterations: 2,
                ..ReactSqlAgentConfig::default()
            },
        );

        let answer = agent
            .answer(request(
                "loop forever",
                &[],
                Arc::new(StudentDatabase::default()),
                ProgressSink::discard(),
            ))
            .await
            .expect("agent stops cleanly");

        assert_eq!(answer, ITERATION_LIMIT_ANSWER);
        assert_eq!(gateway.requests().len(), 2);
    }

    #[tokio::test]
    async fn gateway_failure_aborts_the_run() {
        let gateway = ScriptedGateway::new(&[]);
        let agent = ReactSqlAgent::new(gateway, ReactSqlAgentConfig::default());

        let err = agent
            .answer(request(
                "anything",
                &[],
                Arc::new(StudentDatabase::default()),
                ProgressSink::discard(),
            ))
            .await
            .expect_err("gateway failure should propagate");

        assert!(matches!(
            err,
            AgentError::Gateway(LlmGatewayError::ProviderFailure(_))
        ));
    }

    #[tokio::test]
    async fn replays_only_the_recent_history_window() {
        let history = (0..10)
            .map(|turn| SessionMessage::user(format!("earlier question {turn}")))
            .collect::<Vec<_>>();
        let gateway = ScriptedGateway::new(&[r#"{"final_answer":"ok"}"#]);
        let agent = ReactSqlAgent::new(
            gateway.clone(),
            ReactSqlAgentConfig {
                history_window: 2,
                ..ReactSqlAgentConfig::default()
            },
        );

        agent
            .answer(request(
                "latest",
                &history,
                Arc::new(StudentDatabase::default()),
                ProgressSink::discard(),
            ))
            .await
            .expect("agent answers");

        let messages = &gateway.requests()[0].messages;
        let contents = messages
            .iter()
            .skip(1)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            contents,
            vec![
                "earlier question 8",
                "earlier question 9",
                "Question: latest"
            ]
        );
    }

    #[test]
    fn strip_sql_fences_handles_plain_and_fenced_sql() {
        assert_eq!(strip_sql_fences("  SELECT 1 "), "SELECT 1");
        assert_eq!(strip_sql_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_sql_fences("```\nSELECT 1```"), "SELECT 1");
    }
}
