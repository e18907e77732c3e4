use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub text: String,
}

/// One role-tagged turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock { text: text.into() }],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock { text: text.into() }],
        }
    }

    /// All text segments of the turn, concatenated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    /// Sent as a model-specific field, outside the standard inference block.
    pub top_k: Option<u32>,
}

impl InferenceConfig {
    /// Near-deterministic settings for spreadsheet conversion.
    pub const fn conversion() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.01,
            top_p: None,
            top_k: Some(250),
        }
    }

    /// Slightly warmer settings for the discrepancy comparison.
    pub const fn comparison() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.1,
            top_p: None,
            top_k: Some(250),
        }
    }

    pub fn with_top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Throttling, server-side failures and flaky transport are worth another try.
    /// Bad requests, auth failures and unreadable payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CompletionError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            CompletionError::MalformedResponse(_) => false,
        }
    }
}

/// A completion failure that ends the run.
#[derive(Debug, Error)]
#[error("Can't invoke '{model_id}'. Reason: {source}")]
pub struct ServiceFailure {
    pub model_id: String,
    #[source]
    pub source: CompletionError,
}

/// A conversational completion endpoint.
///
/// Implementations return the text of the first segment of the first
/// response message, untrimmed.
#[allow(async_fn_in_trait)]
pub trait CompletionService {
    async fn converse(
        &self,
        model_id: &str,
        messages: &[Message],
        inference: &InferenceConfig,
    ) -> Result<String, CompletionError>;
}

impl<S: CompletionService> CompletionService for &S {
    async fn converse(
        &self,
        model_id: &str,
        messages: &[Message],
        inference: &InferenceConfig,
    ) -> Result<String, CompletionError> {
        (**self).converse(model_id, messages, inference).await
    }
}

/// Send a conversation and return the trailing-whitespace-trimmed reply.
pub async fn invoke<S: CompletionService>(
    service: &S,
    model_id: &str,
    messages: &[Message],
    inference: &InferenceConfig,
) -> Result<String, ServiceFailure> {
    debug!(
        model = model_id,
        turns = messages.len(),
        prompt_chars = messages.iter().map(|m| m.text().len()).sum::<usize>(),
        temperature = inference.temperature,
        "Sending conversation"
    );
    match service.converse(model_id, messages, inference).await {
        Ok(text) => Ok(text.trim_end().to_string()),
        Err(source) => Err(ServiceFailure {
            model_id: model_id.to_string(),
            source,
        }),
    }
}

/// Client for the Bedrock Converse REST API.
pub struct BedrockClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl BedrockClient {
    pub fn from_env() -> Result<Self> {
        let region = dotenv::var("BEDROCK_REGION")
            .or_else(|_| dotenv::var("AWS_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());
        let base_url = dotenv::var("BEDROCK_ENDPOINT")
            .unwrap_or_else(|_| format!("https://bedrock-runtime.{}.amazonaws.com", region));
        let bearer_token = dotenv::var("AWS_BEARER_TOKEN_BEDROCK")
            .ok()
            .filter(|k| !k.is_empty());
        let timeout_secs = match dotenv::var("BEDROCK_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .context("BEDROCK_TIMEOUT_SECS must be a whole number of seconds")?,
            Err(_) => 300,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            bearer_token,
        })
    }

    fn endpoint(&self, model_id: &str) -> String {
        format!(
            "{}/model/{}/converse",
            self.base_url.trim_end_matches('/'),
            model_id
        )
    }
}

fn request_body(messages: &[Message], inference: &InferenceConfig) -> serde_json::Value {
    let mut inference_config = serde_json::json!({
        "maxTokens": inference.max_tokens,
        "temperature": inference.temperature,
    });
    if let Some(top_p) = inference.top_p {
        inference_config["topP"] = serde_json::json!(top_p);
    }

    let mut body = serde_json::json!({
        "messages": messages,
        "inferenceConfig": inference_config,
    });
    if let Some(top_k) = inference.top_k {
        body["additionalModelRequestFields"] = serde_json::json!({ "top_k": top_k });
    }
    body
}

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Option<OutputMessage>,
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    #[serde(default)]
    content: Vec<OutputBlock>,
}

#[derive(Debug, Deserialize)]
struct OutputBlock {
    text: Option<String>,
}

fn first_text_segment(payload: &str) -> Result<String, CompletionError> {
    let response: ConverseResponse = serde_json::from_str(payload)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
    response
        .output
        .message
        .and_then(|message| message.content.into_iter().next())
        .and_then(|block| block.text)
        .ok_or_else(|| {
            CompletionError::MalformedResponse("no text segment in output message".to_string())
        })
}

impl CompletionService for BedrockClient {
    async fn converse(
        &self,
        model_id: &str,
        messages: &[Message],
        inference: &InferenceConfig,
    ) -> Result<String, CompletionError> {
        let mut req = self
            .client
            .post(self.endpoint(model_id))
            .json(&request_body(messages, inference));
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let payload = resp.text().await?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: payload,
            });
        }

        first_text_segment(&payload)
    }
}

/// Backoff schedule for retryable completion errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Wraps a service with bounded exponential backoff.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<S: CompletionService> CompletionService for Retrying<S> {
    async fn converse(
        &self,
        model_id: &str,
        messages: &[Message],
        inference: &InferenceConfig,
    ) -> Result<String, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.inner.converse(model_id, messages, inference).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        model = model_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable completion error, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedService;
    use super::*;

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn throttled() -> CompletionError {
        CompletionError::Status {
            status: 429,
            body: "ThrottlingException".to_string(),
        }
    }

    #[test]
    fn test_message_serializes_as_converse_turn() {
        let value = serde_json::to_value(Message::assistant("NO_DIFF")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "role": "assistant", "content": [{ "text": "NO_DIFF" }] })
        );
    }

    #[test]
    fn test_request_body_carries_inference_settings() {
        let body = request_body(&[Message::user("hi")], &InferenceConfig::conversion());
        assert_eq!(body["inferenceConfig"]["maxTokens"], 4096);
        assert!(body["inferenceConfig"].get("topP").is_none());
        assert_eq!(body["additionalModelRequestFields"]["top_k"], 250);
        assert_eq!(body["messages"][0]["role"], "user");

        let with_top_p = InferenceConfig::comparison().with_top_p(Some(0.5));
        let body = request_body(&[], &with_top_p);
        assert_eq!(body["inferenceConfig"]["topP"], 0.5);
    }

    #[test]
    fn test_first_text_segment() {
        let payload = r#"{"output":{"message":{"role":"assistant","content":[{"text":"first"},{"text":"second"}]}},"stopReason":"end_turn"}"#;
        assert_eq!(first_text_segment(payload).unwrap(), "first");

        let empty = r#"{"output":{"message":{"role":"assistant","content":[]}}}"#;
        assert!(matches!(
            first_text_segment(empty),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(first_text_segment("not json").is_err());
    }

    #[test]
    fn test_retry_classification() {
        assert!(throttled().is_retryable());
        assert!(CompletionError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!CompletionError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!CompletionError::Status { status: 403, body: String::new() }.is_retryable());
        assert!(!CompletionError::MalformedResponse(String::new()).is_retryable());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_retrying_recovers_from_throttling() {
        let inner = ScriptedService::new(vec![Err(throttled()), Ok("done".to_string())]);
        let service = Retrying::new(&inner, instant_policy(3));
        let reply = service
            .converse("model", &[Message::user("q")], &InferenceConfig::comparison())
            .await
            .unwrap();
        assert_eq!(reply, "done");
        assert_eq!(inner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_retrying_gives_up_on_permanent_errors() {
        let inner = ScriptedService::new(vec![
            Err(CompletionError::Status {
                status: 403,
                body: "AccessDenied".to_string(),
            }),
            Ok("never".to_string()),
        ]);
        let service = Retrying::new(&inner, instant_policy(3));
        let result = service
            .converse("model", &[Message::user("q")], &InferenceConfig::comparison())
            .await;
        assert!(matches!(result, Err(CompletionError::Status { status: 403, .. })));
        assert_eq!(inner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_retrying_respects_budget() {
        let inner = ScriptedService::new((0..5).map(|_| Err(throttled())));
        let service = Retrying::new(&inner, instant_policy(2));
        let result = service
            .converse("model", &[Message::user("q")], &InferenceConfig::comparison())
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_invoke_trims_and_names_model_on_failure() {
        let service = ScriptedService::replying(&["  payload \n\n"]);
        let text = invoke(&service, "m-1", &[Message::user("q")], &InferenceConfig::conversion())
            .await
            .unwrap();
        assert_eq!(text, "  payload");

        let failing = ScriptedService::new(vec![Err(CompletionError::Status {
            status: 400,
            body: "ValidationException".to_string(),
        })]);
        let err = invoke(&failing, "m-1", &[Message::user("q")], &InferenceConfig::conversion())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't invoke 'm-1'. Reason: service returned status 400: ValidationException"
        );
    }
}
