//! Conversation sessions: request worker, controller and tab set.

pub mod controller;
pub mod events;
pub mod manager;
pub mod worker;

pub use controller::{DEFAULT_FONT_SIZE, SessionController, SessionOptions};
pub use events::{RequestId, RequestOutcome, SessionEvent, SessionId, SessionUpdate, WorkerEvent};
pub use manager::ConversationManager;
pub use worker::{RequestWorker, WorkerState};
