use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    Action {
        thought: String,
        tool: String,
        input: String,
    },
    Final {
        thought: String,
        answer: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepParseError {
    #[error("reply is not a JSON object")]
    NotJson,
    #[error("reply has neither an action nor a final_answer")]
    MissingAction,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    thought: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    action_input: Option<Value>,
    #[serde(default)]
    final_answer: Option<Value>,
}

/// Parses one model turn. Tolerates markdown code fences and prose around the object.
pub fn parse_step(content: &str) -> Result<AgentStep, StepParseError> {
    let object = extract_json_object(content).ok_or(StepParseError::NotJson)?;
    let raw: RawStep = serde_json::from_str(object).map_err(|_| StepParseError::NotJson)?;
    let thought = raw.thought.unwrap_or_default().trim().to_string();

    if let Some(answer) = raw.final_answer.filter(|value| !value.is_null()) {
        return Ok(AgentStep::Final {
            thought,
            answer: value_to_text(answer),
        });
    }

    match raw.action.map(|action| action.trim().to_string()) {
        Some(tool) if !tool.is_empty() => Ok(AgentStep::Action {
            thought,
            tool,
            input: raw.action_input.map(action_input_text).unwrap_or_default(),
        }),
        _ => Err(StepParseError::MissingAction),
    }
}

fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (start < end).then(|| &content[start..=end])
}

fn action_input_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some((_, Value::String(text))) => text,
            Some((key, other)) => {
                let mut single = serde_json::Map::new();
                single.insert(key, other);
                Value::Object(single).to_string()
            }
            None => String::new(),
        },
        other => value_to_text(other),
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
