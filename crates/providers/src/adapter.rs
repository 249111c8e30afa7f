use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::mock::MockProvider;
use crate::types::*;
use chatdesk_core::{ApiKey, Error, ProviderConfig, ProviderKind, RemoteError, Result};

/// Longest slice of an error body carried into a [`RemoteError`] message
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Chat completion backend
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Issue one completion request
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, RemoteError>;

    /// Model identifier sent with each request
    fn model(&self) -> &str;
}

/// OpenAI-compatible chat completions provider
pub struct OpenAiProvider {
    client: HttpClient,
    api_key: ApiKey,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: ApiKey, model: String, base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self { client, api_key, model, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// Convert ChatRequest to the chat completions wire format
    fn to_openai_request(&self, request: &ChatRequest) -> OpenAiChatRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| OpenAiMessage {
                role: match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: msg.content.clone(),
            })
            .collect();

        OpenAiChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Map a non-success HTTP status to a [`RemoteError`]
fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let detail = error_detail(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::auth(format!("Authentication failed ({}): {}", status.as_u16(), detail))
        }
        StatusCode::TOO_MANY_REQUESTS => RemoteError::rate_limit(format!("Rate limit exceeded: {}", detail)),
        _ => RemoteError::api(format!("API error {}: {}", status, detail)),
    }
}

/// Prefer `error.message` from a JSON error body, else a truncated raw body
fn error_detail(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<OpenAiErrorBody>(body)
        && let Some(message) = parsed.error.message
    {
        return message;
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let mut cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        trimmed.to_string()
    }
}

fn transport_error(err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::timeout("Request timed out")
    } else if err.is_connect() {
        RemoteError::transport(format!("Connection failed: {}", err))
    } else {
        RemoteError::transport(format!("Request failed: {}", err))
    }
}

/// Parse a successful response body
fn parse_response(body: &str) -> std::result::Result<ChatResponse, RemoteError> {
    let parsed: OpenAiChatResponse =
        serde_json::from_str(body).map_err(|e| RemoteError::decode(format!("Malformed response: {}", e)))?;

    let choice = parsed.choices.into_iter().next().ok_or_else(RemoteError::empty_response)?;
    let content = choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(RemoteError::empty_response)?;

    let mut response = ChatResponse::new(ChatMessage::assistant(content));
    if let Some(usage) = parsed.usage {
        response = response.with_usage(usage);
    }
    if let Some(reason) = choice.finish_reason {
        response = response.with_finish_reason(reason);
    }
    Ok(response)
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, RemoteError> {
        let body = self.to_openai_request(&request);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), body_len = text.len(), "chat completion rejected");
            return Err(status_error(status, &text));
        }

        parse_response(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Chat completions request body
#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Factory to create providers from config
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        match config.kind {
            ProviderKind::OpenAi => {
                let api_key = config.resolve_api_key()?;
                Ok(Arc::new(OpenAiProvider::new(
                    api_key,
                    config.model.clone(),
                    Some(config.base_url.clone()),
                    Duration::from_millis(config.timeout_ms),
                )?))
            }
            ProviderKind::Mock => {
                let provider = match &config.responses_file {
                    Some(path) => MockProvider::from_file(path)?,
                    None => MockProvider::default(),
                };
                Ok(Arc::new(provider.with_model(config.model.clone())))
            }
        }
    }
}
