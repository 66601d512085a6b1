use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmTokenUsage, ResponseFormat,
};
use crate::config::ConfigError;
use crate::config_env::{optional_trimmed_env, parse_u32_env, parse_u64_env, require_env};

pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const MISSING_API_KEY_MESSAGE: &str =
    "Groq API key is missing. Please ensure it's set in the .env file.";

const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 250;

const DEFAULT_PRIMARY_MODEL: &str = "llama3-8b-8192";

#[derive(Debug, Clone)]
pub struct GroqModelRoute {
    pub primary_model: String,
    pub fallback_model: Option<String>,
}

impl GroqModelRoute {
    fn candidate_models(&self) -> Vec<&str> {
        let mut candidates = Vec::new();
        if !self.primary_model.is_empty() {
            candidates.push(self.primary_model.as_str());
        }

        if let Some(fallback_model) = self.fallback_model.as_deref()
            && !fallback_model.is_empty()
            && fallback_model != self.primary_model
        {
            candidates.push(fallback_model);
        }

        candidates
    }
}

#[derive(Clone)]
pub struct GroqGatewayConfig {
    pub chat_completions_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
    pub model_route: GroqModelRoute,
}

impl std::fmt::Debug for GroqGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqGatewayConfig")
            .field("chat_completions_url", &self.chat_completions_url)
            .field("api_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_base_backoff_ms", &self.retry_base_backoff_ms)
            .field("model_route", &self.model_route)
            .finish()
    }
}

impl GroqGatewayConfig {
    /// Fails with [`ConfigError::MissingVar`] for `GROQ_API_KEY` when the credential is
    /// absent or blank; see [`is_missing_api_key`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = require_env(GROQ_API_KEY_ENV)?;
        let chat_completions_url = optional_trimmed_env("GROQ_CHAT_COMPLETIONS_URL")
            .unwrap_or_else(|| DEFAULT_CHAT_COMPLETIONS_URL.to_string());
        if !chat_completions_url.starts_with("http://")
            && !chat_completions_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidConfiguration(
                "GROQ_CHAT_COMPLETIONS_URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            chat_completions_url,
            api_key,
            timeout_ms: parse_u64_env("GROQ_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            max_retries: parse_u32_env("GROQ_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base_backoff_ms: parse_u64_env(
                "GROQ_RETRY_BASE_BACKOFF_MS",
                DEFAULT_RETRY_BASE_BACKOFF_MS,
            )?,
            model_route: parse_model_route(),
        })
    }
}

pub fn is_missing_api_key(err: &ConfigError) -> bool {
    matches!(err, ConfigError::MissingVar(key) if key == GROQ_API_KEY_ENV)
}

#[derive(Clone)]
pub struct GroqGateway {
    client: reqwest::Client,
    config: GroqGatewayConfig,
}

impl GroqGateway {
    pub fn new(config: GroqGatewayConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn primary_model(&self) -> &str {
        &self.config.model_route.primary_model
    }

    /// Walks the model route. Transient failures are retried on the same model with
    /// exponential backoff before the route moves on; credential failures end it.
    async fn complete(
        &self,
        request: &LlmGatewayRequest,
    ) -> Result<LlmGatewayResponse, LlmGatewayError> {
        let models = self.config.model_route.candidate_models();
        let mut last_error =
            LlmGatewayError::ProviderFailure("no_groq_model_candidates".to_string());

        for model in models {
            let mut attempt = 0_u32;
            let failure = loop {
                match self.call(model, request).await {
                    Ok(response) => return Ok(response),
                    Err(failure)
                        if failure.kind == FailureKind::Transient
                            && attempt < self.config.max_retries =>
                    {
                        let backoff_ms = self
                            .config
                            .retry_base_backoff_ms
                            .saturating_mul(2_u64.saturating_pow(attempt));
                        warn!(
                            model,
                            attempt,
                            backoff_ms,
                            error = %failure.error,
                            "retrying groq request"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                    }
                    Err(failure) => break failure,
                }
            };

            if failure.kind == FailureKind::Credential {
                return Err(failure.error);
            }
            warn!(model, error = %failure.error, "groq model failed");
            last_error = failure.error;
        }

        Err(last_error)
    }

    async fn call(
        &self,
        model: &str,
        request: &LlmGatewayRequest,
    ) -> Result<LlmGatewayResponse, CallFailure> {
        let mut request_body = json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature,
        });
        if request.response_format == ResponseFormat::JsonObject {
            request_body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&self.config.chat_completions_url)
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|err| {
                let error = if err.is_timeout() {
                    LlmGatewayError::Timeout
                } else {
                    LlmGatewayError::ProviderFailure("request_unavailable".to_string())
                };
                CallFailure::new(error, FailureKind::Transient)
            })?;

        let status = response.status();
        let request_id = header_request_id(response.headers());
        let body = response.text().await.map_err(|_| {
            CallFailure::new(
                LlmGatewayError::InvalidProviderPayload("response_body_read_failed".to_string()),
                FailureKind::ModelSpecific,
            )
        })?;

        if !status.is_success() {
            let error = LlmGatewayError::ProviderFailure(format!(
                "status={} code={}",
                status.as_u16(),
                parse_provider_error_code(&body)
            ));
            return Err(CallFailure::new(error, classify_status(status)));
        }

        decode_completion(model, request_id, &body)
            .map_err(|error| CallFailure::new(error, FailureKind::ModelSpecific))
    }
}

impl LlmGateway for GroqGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move { self.complete(&request).await })
    }
}

/// What a failed call means for the rest of the model route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// Transport error, timeout, 408, 429 or 5xx: retry the same model.
    Transient,
    /// Other 4xx or an unusable payload: move to the next model.
    ModelSpecific,
    /// 401 or 403: no other model will accept the key either.
    Credential,
}

#[derive(Debug)]
struct CallFailure {
    error: LlmGatewayError,
    kind: FailureKind,
}

impl CallFailure {
    fn new(error: LlmGatewayError, kind: FailureKind) -> Self {
        Self { error, kind }
    }
}

#[derive(Debug, Deserialize)]
struct GroqSuccessResponse {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<GroqChoice>,
    usage: Option<GroqUsage>,
}

#[derive(Debug, Deserialize)]
struct GroqChoice {
    message: GroqMessage,
}

#[derive(Debug, Deserialize)]
struct GroqMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroqUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

fn parse_model_route() -> GroqModelRoute {
    GroqModelRoute {
        primary_model: optional_trimmed_env("GROQ_MODEL_PRIMARY")
            .unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
        fallback_model: optional_trimmed_env("GROQ_MODEL_FALLBACK"),
    }
}

fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Credential,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => FailureKind::Transient,
        status if status.is_server_error() => FailureKind::Transient,
        _ => FailureKind::ModelSpecific,
    }
}

fn decode_completion(
    model: &str,
    request_id: Option<String>,
    body: &str,
) -> Result<LlmGatewayResponse, LlmGatewayError> {
    let parsed: GroqSuccessResponse = serde_json::from_str(body).map_err(|_| {
        LlmGatewayError::InvalidProviderPayload("response_json_parse_failed".to_string())
    })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmGatewayError::InvalidProviderPayload("missing_choice".to_string()))?;
    let content = choice
        .message
        .content
        .ok_or_else(|| LlmGatewayError::InvalidProviderPayload("missing_content".to_string()))?;

    let usage = parsed.usage.map(|usage| LlmTokenUsage {
        prompt_tokens: clamp_u64_to_u32(usage.prompt_tokens.unwrap_or(0)),
        completion_tokens: clamp_u64_to_u32(usage.completion_tokens.unwrap_or(0)),
        total_tokens: clamp_u64_to_u32(usage.total_tokens.unwrap_or(0)),
    });
    debug!(
        model,
        total_tokens = usage.as_ref().map(|usage| usage.total_tokens),
        "groq completion received"
    );

    Ok(LlmGatewayResponse {
        model: parsed.model.unwrap_or_else(|| model.to_string()),
        provider_request_id: request_id.or(parsed.id),
        content,
        usage,
    })
}

fn header_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn parse_provider_error_code(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorDetails>,
    }

    #[derive(Deserialize)]
    struct ProviderErrorDetails {
        code: Option<Value>,
    }

    let parsed = serde_json::from_str::<ProviderErrorEnvelope>(body).ok();
    let Some(provider_error_code) = parsed
        .and_then(|envelope| envelope.error)
        .and_then(|details| details.code)
    else {
        return "unknown".to_string();
    };

    match provider_error_code {
        Value::String(code) => code,
        Value::Number(code) => code.to_string(),
        _ => "unknown".to_string(),
    }
}

fn clamp_u64_to_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}
