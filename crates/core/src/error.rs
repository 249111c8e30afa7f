use thiserror::Error;

/// Result type alias for chatdesk-core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for a chat session
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error for file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prompt was blank after trimming whitespace
    #[error("The prompt is empty.")]
    EmptyPrompt,

    /// A request is already in flight for this session
    #[error("a request is already in flight for this conversation")]
    RequestInFlight,

    /// Failure reported by the remote model API
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// Persistence failures (database writes, schema problems)
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Parse/serialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// The session was closed while an operation was pending
    #[error("conversation is closed")]
    SessionClosed,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors the user can fix without any state having changed
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Error::EmptyPrompt | Error::RequestInFlight)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Classification of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteErrorKind {
    /// Connection could not be established or was dropped
    Transport,
    /// The request exceeded its deadline
    Timeout,
    /// The API rejected the credential (401/403)
    Auth,
    /// The API throttled the request (429)
    RateLimit,
    /// Any other non-success response from the API
    Api,
    /// The response body could not be decoded
    Decode,
    /// The response decoded but carried no content
    EmptyResponse,
    /// The request was cancelled locally
    Cancelled,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::Transport => "transport",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Auth => "auth",
            RemoteErrorKind::RateLimit => "rate-limit",
            RemoteErrorKind::Api => "api",
            RemoteErrorKind::Decode => "decode",
            RemoteErrorKind::EmptyResponse => "empty-response",
            RemoteErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the remote model client
///
/// Every transport, auth, or rate-limit failure is folded into this type so
/// callers always receive a tagged failure instead of a panic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Auth, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::RateLimit, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Api, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Decode, message)
    }

    pub fn empty_response() -> Self {
        Self::new(RemoteErrorKind::EmptyResponse, "model returned an empty response")
    }

    pub fn cancelled() -> Self {
        Self::new(RemoteErrorKind::Cancelled, "request cancelled")
    }
}
