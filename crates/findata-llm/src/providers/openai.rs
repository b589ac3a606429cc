//! OpenAI-compatible provider implementation
//!
//! Works against any `/chat/completions` endpoint: OpenAI itself, DeepSeek
//! (`https://api.deepseek.com/v1`), or local gateways. The base URL is part
//! of the configuration, never hard-coded at call sites.

use crate::{
    ChunkStream, CompletionChunk, CompletionRequest, CompletionResponse, LLMProvider, Message,
    Result, Role, TokenUsage,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: String,

    /// Base URL for the API (default: DeepSeek)
    pub api_base: String,

    /// Request timeout in seconds (default: 120)
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    /// Create a new config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create config from environment variables
    ///
    /// Reads the API key from `DEEPSEEK_API_KEY` and, when set, the base URL
    /// from `DEEPSEEK_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").map_err(|_| {
            crate::LLMError::ConfigurationError(
                "DEEPSEEK_API_KEY environment variable not set".to_string(),
            )
        })?;

        let api_base =
            std::env::var("DEEPSEEK_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Ok(Self {
            api_key,
            api_base,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// OpenAI-compatible chat-completion provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    /// Create a new provider with custom configuration
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a new provider with API key and default settings
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAIConfig::new(api_key))
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        let config = OpenAIConfig::from_env()?;
        Self::with_config(config)
    }

    /// Get the current configuration
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    async fn send_request(&self, body: &ApiRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            return Err(match status.as_u16() {
                401 => crate::LLMError::AuthenticationFailed,
                429 => crate::LLMError::RateLimitExceeded(error_text),
                400 => crate::LLMError::InvalidRequest(error_text),
                404 => crate::LLMError::ModelNotFound(body.model.clone()),
                _ => crate::LLMError::RequestFailed(format!("HTTP {status}: {error_text}")),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to {}", self.config.api_base);

        let body = ApiRequest::from_completion(&request, false);
        let response = self.send_request(&body).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            crate::LLMError::UnexpectedResponse(format!("Failed to parse response: {e}"))
        })?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            crate::LLMError::UnexpectedResponse("No choices in response".to_string())
        })?;

        let usage = api_response.usage.map(TokenUsage::from).unwrap_or_default();

        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Response received"
        );

        Ok(CompletionResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        debug!("Opening completion stream");

        let body = ApiRequest::from_completion(&request, true);
        let response = self.send_request(&body).await?;

        // Parse the SSE body on a task; hand chunks over a channel so the
        // caller drains a plain stream without knowing about SSE framing.
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<CompletionChunk>>();

        tokio::spawn(async move {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = bytes_stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(crate::LLMError::StreamError(e.to_string())));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE events are newline-delimited; keep the trailing
                // partial line in the buffer for the next read.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    match parse_sse_line(&line) {
                        SseLine::Delta(delta) => {
                            if tx.send(Ok(CompletionChunk { delta })).is_err() {
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Skip => {}
                        SseLine::Malformed(msg) => {
                            warn!(line = %line, "Skipping malformed stream line: {msg}");
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// One parsed line of an SSE completion stream
enum SseLine {
    Delta(String),
    Done,
    Skip,
    Malformed(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        // Comments, blank keep-alive lines, event names
        return SseLine::Skip;
    };

    let data = data.trim();
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => {
            let delta = event
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if delta.is_empty() {
                SseLine::Skip
            } else {
                SseLine::Delta(delta)
            }
        }
        Err(e) => SseLine::Malformed(e.to_string()),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl ApiRequest {
    /// Build the wire request; the system prompt goes into the messages
    /// array, first, per the OpenAI convention.
    fn from_completion(request: &CompletionRequest, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for msg in &request.messages {
            messages.push(ApiMessage {
                role: match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                }
                .to_string(),
                content: msg.content.clone(),
            });
        }

        Self {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

impl From<ApiUsage> for TokenUsage {
    fn from(usage: ApiUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAIProvider::new("test-key");
        assert!(provider.is_ok());
        let provider = provider.unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.config().api_key, "test-key");
        assert_eq!(provider.config().api_base, "https://api.deepseek.com/v1");
    }

    #[test]
    fn test_provider_with_custom_config() {
        let config = OpenAIConfig::new("test-key")
            .with_api_base("http://localhost:8000/v1")
            .with_timeout(60);

        let provider = OpenAIProvider::with_config(config).unwrap();
        assert_eq!(provider.config().api_base, "http://localhost:8000/v1");
        assert_eq!(provider.config().timeout_secs, 60);
    }

    #[test]
    fn test_request_conversion_places_system_first() {
        let request = CompletionRequest::builder("deepseek-chat")
            .system("rules")
            .add_message(Message::user("intent"))
            .add_message(Message::assistant("code"))
            .build();

        let body = ApiRequest::from_completion(&request, false);
        assert_eq!(body.messages.len(), 3);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[0].content, "rules");
        assert_eq!(body.messages[1].role, "user");
        assert_eq!(body.messages[2].role, "assistant");
        assert!(!body.stream);
    }

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"df = pro"}}]}"#;
        match parse_sse_line(line) {
            SseLine::Delta(delta) => assert_eq!(delta, "df = pro"),
            _ => panic!("Expected delta"),
        }
    }

    #[test]
    fn test_parse_sse_done() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
    }

    #[test]
    fn test_parse_sse_skips_noise() {
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#),
            SseLine::Skip
        ));
    }

    #[test]
    fn test_parse_sse_malformed() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            SseLine::Malformed(_)
        ));
    }
}
