//! Remote model client.
//!
//! [`ModelClient`] keeps no conversation state of its own. Every call receives
//! the transcript context explicitly and sends `context ++ [prompt]`.

use std::sync::Arc;

use crate::adapter::Provider;
use crate::retry::{RetryConfig, is_retryable};
use crate::types::{ChatMessage, ChatRequest};
use chatdesk_core::{ContextEntry, RemoteError, RequestParameters};

/// Successful completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Raw model output (Markdown)
    pub content: String,
    pub token_usage: u32,
}

#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
    retry: RetryConfig,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("model", &self.provider.model())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ModelClient {
    pub fn new(provider: Arc<dyn Provider>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send `prompt` after `context`, retrying transient failures.
    pub async fn send(
        &self, context: &[ContextEntry], prompt: &str, params: RequestParameters,
    ) -> Result<Completion, RemoteError> {
        let request = ChatRequest::builder()
            .context(context)
            .add_message(ChatMessage::user(prompt))
            .parameters(params)
            .build();

        let mut attempt = 0u32;
        loop {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            tracing::debug!(
                model = self.provider.model(),
                attempt,
                context_len = context.len(),
                prompt_len = prompt.len(),
                max_tokens = params.max_tokens(),
                temperature = params.temperature(),
                "sending chat request"
            );

            match self.provider.chat(request.clone()).await {
                Ok(response) => {
                    let token_usage = response.total_tokens();
                    tracing::debug!(attempt, token_usage, content_len = response.message.content.len(), "chat request ok");
                    return Ok(Completion { content: response.message.content, token_usage });
                }
                Err(err) if is_retryable(&err) && self.retry.should_retry(attempt) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        kind = %err.kind,
                        "chat request failed, retrying"
                    );
                }
                Err(err) => {
                    tracing::warn!(attempt, kind = %err.kind, error = %err, "chat request failed");
                    return Err(err);
                }
            }
        }
    }
}
