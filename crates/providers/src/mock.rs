use crate::Provider;
use crate::types::*;
use chatdesk_core::{Error, RemoteError, RemoteErrorKind, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted response for deterministic runs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MockResponse {
    Text {
        content: String,
        #[serde(default = "default_usage")]
        total_tokens: u32,
        #[serde(default)]
        delay_ms: u64,
    },
    Error {
        kind: RemoteErrorKind,
        message: String,
        #[serde(default)]
        delay_ms: u64,
    },
    /// A reply whose content is null
    Empty {
        #[serde(default)]
        delay_ms: u64,
    },
}

fn default_usage() -> u32 {
    10
}

impl MockResponse {
    pub fn text(content: impl Into<String>, total_tokens: u32) -> Self {
        Self::Text { content: content.into(), total_tokens, delay_ms: 0 }
    }

    pub fn error(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Error { kind, message: message.into(), delay_ms: 0 }
    }

    pub fn empty() -> Self {
        Self::Empty { delay_ms: 0 }
    }

    pub fn with_delay(self, ms: u64) -> Self {
        match self {
            Self::Text { content, total_tokens, .. } => Self::Text { content, total_tokens, delay_ms: ms },
            Self::Error { kind, message, .. } => Self::Error { kind, message, delay_ms: ms },
            Self::Empty { .. } => Self::Empty { delay_ms: ms },
        }
    }

    fn delay(&self) -> Duration {
        let ms = match self {
            Self::Text { delay_ms, .. } | Self::Error { delay_ms, .. } | Self::Empty { delay_ms } => *delay_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Mock configuration from TOML file
#[derive(Debug, Deserialize)]
struct MockConfig {
    responses: Vec<MockResponse>,
}

/// Provider that replays scripted responses in order
///
/// Once the script runs out every further call echoes the last user message.
pub struct MockProvider {
    responses: Vec<MockResponse>,
    current: AtomicUsize,
    model: String,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            current: AtomicUsize::new(0),
            model: "mock".to_string(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MockConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse mock responses: {}", e)))?;
        Ok(Self::new(config.responses))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read mock responses file {}: {}", path.display(), e)))?;
        let provider = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), responses = provider.responses.len(), "mock responses loaded");
        Ok(provider)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn next_response(&self, request: &ChatRequest) -> MockResponse {
        let index = self.current.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(index) {
            Some(response) => response.clone(),
            None => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                MockResponse::text(format!("Echo: {}", last_user), 10)
            }
        }
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, RemoteError> {
        let response = self.next_response(&request);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        let delay = response.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match response {
            MockResponse::Text { content, total_tokens, .. } => {
                Ok(ChatResponse::new(ChatMessage::assistant(content)).with_usage(Usage::total(total_tokens)))
            }
            MockResponse::Error { kind, message, .. } => Err(RemoteError::new(kind, message)),
            MockResponse::Empty { .. } => Err(RemoteError::empty_response()),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_parsing() {
        let toml = r#"
[[responses]]
type = "text"
content = "Hello, world!"
total_tokens = 42

[[responses]]
type = "error"
kind = "rate-limit"
message = "slow down"
delay_ms = 5

[[responses]]
type = "empty"
"#;

        let provider = MockProvider::from_toml_str(toml).unwrap();
        assert_eq!(provider.responses.len(), 3);
        assert_eq!(provider.responses[0], MockResponse::text("Hello, world!", 42));
        assert_eq!(
            provider.responses[1],
            MockResponse::error(RemoteErrorKind::RateLimit, "slow down").with_delay(5)
        );
        assert_eq!(provider.responses[2], MockResponse::empty());
    }

    #[test]
    fn test_text_usage_defaults() {
        let provider = MockProvider::from_toml_str("[[responses]]\ntype = \"text\"\ncontent = \"x\"\n").unwrap();
        assert_eq!(provider.responses[0], MockResponse::text("x", 10));
    }

    #[test]
    fn test_bad_script_is_config_error() {
        let err = MockProvider::from_toml_str("[[responses]]\ntype = \"toolcall\"\n").err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mock.toml");
        std::fs::write(&path, "[[responses]]\ntype = \"empty\"\n").unwrap();
        assert_eq!(MockProvider::from_file(&path).unwrap().responses.len(), 1);
        assert!(MockProvider::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[tokio::test]
    async fn test_replays_in_order_then_echoes() {
        let provider = MockProvider::new(vec![
            MockResponse::text("first", 5),
            MockResponse::error(RemoteErrorKind::Auth, "bad key"),
            MockResponse::empty(),
        ]);
        let request = || ChatRequest::builder().add_message(ChatMessage::user("ping")).build();

        let first = provider.chat(request()).await.unwrap();
        assert_eq!(first.message.content, "first");
        assert_eq!(first.total_tokens(), 5);

        let second = provider.chat(request()).await.unwrap_err();
        assert_eq!(second.kind, RemoteErrorKind::Auth);

        let third = provider.chat(request()).await.unwrap_err();
        assert_eq!(third.kind, RemoteErrorKind::EmptyResponse);

        let fourth = provider.chat(request()).await.unwrap();
        assert_eq!(fourth.message.content, "Echo: ping");

        assert_eq!(provider.call_count(), 4);
        assert_eq!(provider.requests().len(), 4);
    }
}
