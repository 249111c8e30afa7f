use chatdesk_core::{Message, RemoteError, SequenceIndex};
use chatdesk_providers::Completion;

/// Per-session request counter value
pub type RequestId = u64;

/// Identifier of one conversation (tab)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages from the request task back to its worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started { request_id: RequestId },
    Succeeded { request_id: RequestId, completion: Completion },
    Failed { request_id: RequestId, error: RemoteError },
}

impl WorkerEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            WorkerEvent::Started { request_id }
            | WorkerEvent::Succeeded { request_id, .. }
            | WorkerEvent::Failed { request_id, .. } => *request_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Started { .. })
    }
}

/// Changes a front-end renders
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Raw prompt text as typed
    UserMessageAppended { content: String, sequence_index: SequenceIndex },
    /// Model output converted to HTML
    AssistantMessageAppended { content: String, token_usage: u32, sequence_index: SequenceIndex },
    RequestFailed { message: String },
    StatusChanged(String),
    InputCleared,
    BusyChanged(bool),
    FontSizeChanged(u32),
}

/// A [`SessionEvent`] tagged with the session that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub session_id: SessionId,
    pub event: SessionEvent,
}

/// How a submitted request ended
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Completed { request_id: RequestId, message: Message },
    Failed { request_id: RequestId, error: RemoteError },
}

impl RequestOutcome {
    pub fn request_id(&self) -> RequestId {
        match self {
            RequestOutcome::Completed { request_id, .. } | RequestOutcome::Failed { request_id, .. } => *request_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Completed { .. })
    }
}
