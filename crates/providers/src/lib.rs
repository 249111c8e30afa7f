pub mod adapter;
pub mod client;
pub mod mock;
pub mod retry;
pub mod types;

pub use adapter::{OpenAiProvider, Provider, ProviderFactory};
pub use client::{Completion, ModelClient};
pub use mock::{MockProvider, MockResponse};
pub use retry::{RetryConfig, is_retryable};
pub use types::{ChatMessage, ChatRequest, ChatResponse, Role, Usage};

pub use chatdesk_core::{Error, RemoteError, RemoteErrorKind, Result};
