use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedSender;

use crate::events::{RequestId, RequestOutcome, SessionEvent, SessionId, SessionUpdate, WorkerEvent};
use crate::worker::{RequestWorker, WorkerState};
use chatdesk_core::{Error, RequestParameters, Result, Role, Transcript, TranscriptView, export, markup};
use chatdesk_providers::ModelClient;
use chatdesk_store::{PersistedRecord, TranscriptArchive};

pub const DEFAULT_FONT_SIZE: u32 = 15;
const MAX_ZOOMABLE_FONT_SIZE: u32 = 30;
const MIN_ZOOMABLE_FONT_SIZE: u32 = 5;
const FONT_SIZE_STEP: u32 = 2;

/// Initial state for a new session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub parameters: RequestParameters,
    pub font_size: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { parameters: RequestParameters::default(), font_size: DEFAULT_FONT_SIZE }
    }
}

impl From<&chatdesk_core::SessionDefaults> for SessionOptions {
    fn from(defaults: &chatdesk_core::SessionDefaults) -> Self {
        Self { parameters: defaults.parameters(), font_size: defaults.font_size }
    }
}

/// One conversation: its transcript, its worker and its view state
pub struct SessionController {
    id: SessionId,
    title: String,
    transcript: Transcript,
    worker: RequestWorker,
    parameters: RequestParameters,
    input: String,
    status: String,
    font_size: u32,
    archive: TranscriptArchive,
    events: UnboundedSender<SessionUpdate>,
    closed: bool,
}

impl SessionController {
    pub fn new(
        id: SessionId, title: impl Into<String>, client: ModelClient, archive: TranscriptArchive,
        events: UnboundedSender<SessionUpdate>, options: SessionOptions,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            transcript: Transcript::new(),
            worker: RequestWorker::new(client),
            parameters: options.parameters,
            input: String::new(),
            status: String::new(),
            font_size: options.font_size,
            archive,
            events,
            closed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn transcript(&self) -> TranscriptView {
        self.transcript.view()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn is_busy(&self) -> bool {
        self.worker.is_busy()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn parameters(&self) -> RequestParameters {
        self.parameters
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(SessionUpdate { session_id: self.id, event });
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.emit(SessionEvent::StatusChanged(self.status.clone()));
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Clear the input field and the status line
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.emit(SessionEvent::InputCleared);
        self.set_status("");
    }

    pub fn update_parameters(&mut self, parameters: RequestParameters) {
        self.parameters = parameters;
        tracing::debug!(
            session = %self.id,
            max_tokens = parameters.max_tokens(),
            temperature = parameters.temperature(),
            "parameters updated"
        );
    }

    pub fn zoom_in(&mut self) {
        if self.font_size < MAX_ZOOMABLE_FONT_SIZE {
            self.font_size += FONT_SIZE_STEP;
            self.emit(SessionEvent::FontSizeChanged(self.font_size));
        }
    }

    pub fn zoom_out(&mut self) {
        if self.font_size > MIN_ZOOMABLE_FONT_SIZE {
            self.font_size -= FONT_SIZE_STEP;
            self.emit(SessionEvent::FontSizeChanged(self.font_size));
        }
    }

    /// Send the current input to the model.
    ///
    /// The user message is appended before this returns; the reply arrives
    /// through [`Self::poll_outcomes`] or [`Self::next_outcome`]. Its
    /// `content` is the trimmed prompt the model receives, and later requests
    /// replay exactly that as context. The input as typed is kept in
    /// `rendered` and carried by `UserMessageAppended`.
    pub fn submit_prompt(&mut self) -> Result<RequestId> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        if self.worker.is_busy() {
            return Err(Error::RequestInFlight);
        }

        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            self.set_status(Error::EmptyPrompt.to_string());
            return Err(Error::EmptyPrompt);
        }

        let params = self.parameters;
        let context = self.transcript.context();
        let request_id = self.worker.dispatch(context, prompt.clone(), params)?;

        let content = self.input.clone();
        let message = self.transcript.append(Role::User, prompt, content.clone(), None);
        tracing::info!(
            session = %self.id,
            request_id,
            prompt_len = message.content.len(),
            context_len = message.sequence_index,
            "prompt submitted"
        );

        self.emit(SessionEvent::BusyChanged(true));
        self.emit(SessionEvent::UserMessageAppended { content, sequence_index: message.sequence_index });
        Ok(request_id)
    }

    fn finish_request(&mut self) {
        self.input.clear();
        self.emit(SessionEvent::InputCleared);
        self.emit(SessionEvent::BusyChanged(false));
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) -> Option<RequestOutcome> {
        match event {
            WorkerEvent::Started { request_id } => {
                tracing::trace!(session = %self.id, request_id, "request started");
                None
            }
            WorkerEvent::Succeeded { request_id, completion } => {
                let html = markup::to_html(&completion.content);
                let message =
                    self.transcript.append_assistant(completion.content, html.clone(), Some(completion.token_usage));

                self.emit(SessionEvent::AssistantMessageAppended {
                    content: html,
                    token_usage: completion.token_usage,
                    sequence_index: message.sequence_index,
                });
                self.set_status(format!("Tokens used: {}", completion.token_usage));
                self.finish_request();
                Some(RequestOutcome::Completed { request_id, message })
            }
            WorkerEvent::Failed { request_id, error } => {
                tracing::warn!(session = %self.id, request_id, kind = %error.kind, "request failed");
                self.emit(SessionEvent::RequestFailed { message: error.to_string() });
                self.set_status(error.to_string());
                self.finish_request();
                Some(RequestOutcome::Failed { request_id, error })
            }
        }
    }

    /// Apply every finished request without waiting
    pub fn poll_outcomes(&mut self) -> Vec<RequestOutcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.worker.try_next() {
            if let Some(outcome) = self.handle_worker_event(event) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Wait for the request in flight to finish; `None` when idle
    pub async fn next_outcome(&mut self) -> Option<RequestOutcome> {
        while let Some(event) = self.worker.next().await {
            if let Some(outcome) = self.handle_worker_event(event) {
                return Some(outcome);
            }
        }
        None
    }

    pub async fn wait_idle(&mut self) {
        while self.next_outcome().await.is_some() {}
    }

    /// Write the transcript as plain text into `dir`
    pub fn save_transcript_to_file(&mut self, dir: &Path) -> Result<PathBuf> {
        match export::write_export(dir, &self.transcript.all()) {
            Ok(path) => {
                self.set_status(format!("Chat log saved to {}", path.display()));
                Ok(path)
            }
            Err(err) => {
                let err = Error::Persistence(err.to_string());
                tracing::error!(session = %self.id, error = %err, "file export failed");
                self.set_status(err.to_string());
                Err(err)
            }
        }
    }

    /// Append the transcript to the `message_logs` archive
    pub fn save_transcript_to_database(&mut self) -> Result<i64> {
        let saved = PersistedRecord::from_context(&self.transcript.context(), chrono::Local::now())
            .and_then(|record| self.archive.insert(&record));

        match saved {
            Ok(id) => {
                self.set_status("Chat log saved to database");
                Ok(id)
            }
            Err(err) => {
                let err = Error::from(err);
                tracing::error!(session = %self.id, error = %err, "database save failed");
                self.set_status(err.to_string());
                Err(err)
            }
        }
    }

    /// Cancel any request in flight; the session accepts no further submits
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let was_busy = self.worker.is_busy();
        self.worker.cancel();
        self.closed = true;
        if was_busy {
            self.emit(SessionEvent::BusyChanged(false));
        }
        tracing::debug!(session = %self.id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_providers::{ChatMessage, MockProvider, MockResponse, RetryConfig};
    use chatdesk_store::RecordStore;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn session(responses: Vec<MockResponse>) -> (SessionController, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ModelClient::new(Arc::new(MockProvider::new(responses)), RetryConfig::single_attempt());
        let archive = TranscriptArchive::new(Arc::new(RecordStore::open_in_memory().unwrap()));
        let controller =
            SessionController::new(SessionId(1), "Conversation #1", client, archive, tx, SessionOptions::default());
        (controller, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(update) = rx.try_recv() {
            events.push(update.event);
        }
        events
    }

    #[tokio::test]
    async fn test_success_event_order() {
        let (mut session, mut rx) = session(vec![MockResponse::text("**Hi**", 12)]);
        session.set_input("Hello");
        session.submit_prompt().unwrap();
        session.wait_idle().await;

        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::BusyChanged(true),
                SessionEvent::UserMessageAppended { content: "Hello".to_string(), sequence_index: 0 },
                SessionEvent::AssistantMessageAppended {
                    content: "<p><strong>Hi</strong></p>\n".to_string(),
                    token_usage: 12,
                    sequence_index: 1,
                },
                SessionEvent::StatusChanged("Tokens used: 12".to_string()),
                SessionEvent::InputCleared,
                SessionEvent::BusyChanged(false),
            ]
        );
        assert_eq!(session.status(), "Tokens used: 12");
        assert_eq!(session.input(), "");
    }

    #[tokio::test]
    async fn test_trimmed_prompt_is_what_the_model_sees_on_every_turn() {
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text("ok", 1), MockResponse::text("again", 1)]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = ModelClient::new(provider.clone(), RetryConfig::single_attempt());
        let archive = TranscriptArchive::new(Arc::new(RecordStore::open_in_memory().unwrap()));
        let mut session = SessionController::new(SessionId(1), "t", client, archive, tx, SessionOptions::default());

        session.set_input("  spaced out \n");
        session.submit_prompt().unwrap();
        session.wait_idle().await;
        session.set_input("next");
        session.submit_prompt().unwrap();
        session.wait_idle().await;

        let first = &session.transcript().all()[0];
        assert_eq!(first.content, "spaced out");
        assert_eq!(first.rendered, "  spaced out \n");

        let sent = provider.requests();
        assert_eq!(sent[0].messages.last().map(|m| m.content.as_str()), Some("spaced out"));
        assert_eq!(sent[1].messages[0], ChatMessage::user("spaced out"));

        let mut appended = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if let SessionEvent::UserMessageAppended { content, .. } = update.event {
                appended.push(content);
            }
        }
        assert_eq!(appended[0], "  spaced out \n");
    }

    #[tokio::test]
    async fn test_parameters_are_snapshotted_at_dispatch() {
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text("ok", 1).with_delay(20)]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = ModelClient::new(provider.clone(), RetryConfig::single_attempt());
        let archive = TranscriptArchive::new(Arc::new(RecordStore::open_in_memory().unwrap()));
        let mut session = SessionController::new(SessionId(1), "t", client, archive, tx, SessionOptions::default());

        session.set_input("q");
        session.submit_prompt().unwrap();
        session.update_parameters(RequestParameters::new(4000, 1.9));
        session.wait_idle().await;

        assert_eq!(provider.requests()[0].max_tokens, Some(200));
        assert_eq!(session.parameters().max_tokens(), 4000);
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_a_no_op() {
        let (mut session, _rx) = session(vec![MockResponse::text("ok", 1).with_delay(30)]);
        session.set_input("first");
        session.submit_prompt().unwrap();

        session.set_input("second");
        assert!(matches!(session.submit_prompt(), Err(Error::RequestInFlight)));
        assert_eq!(session.transcript().len(), 1);

        session.wait_idle().await;
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn test_zoom_bounds() {
        let (mut session, mut rx) = session(vec![]);
        assert_eq!(session.font_size(), 15);

        for _ in 0..20 {
            session.zoom_in();
        }
        assert_eq!(session.font_size(), 31);

        for _ in 0..20 {
            session.zoom_out();
        }
        assert_eq!(session.font_size(), 5);

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&SessionEvent::FontSizeChanged(17)));
        assert_eq!(events.last(), Some(&SessionEvent::FontSizeChanged(5)));
    }

    #[test]
    fn test_clear_input_clears_status() {
        let (mut session, _rx) = session(vec![]);
        session.set_input("   ");
        assert!(matches!(session.submit_prompt(), Err(Error::EmptyPrompt)));
        assert_eq!(session.status(), "The prompt is empty.");

        session.set_input("draft");
        session.clear_input();
        assert_eq!(session.input(), "");
        assert_eq!(session.status(), "");
    }

    #[tokio::test]
    async fn test_save_to_database() {
        let (mut session, _rx) = session(vec![MockResponse::text("A", 3)]);
        session.set_input("Q");
        session.submit_prompt().unwrap();
        session.wait_idle().await;

        let id = session.save_transcript_to_database().unwrap();
        assert_eq!(session.status(), "Chat log saved to database");

        let archived = session.archive.list().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, id);
        let entries = archived[0].record.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].role, Role::Assistant);
    }

    #[test]
    fn test_save_to_database_failure_is_reported() {
        let (mut session, _rx) = session(vec![]);
        session.archive.store().close().unwrap();

        let err = session.save_transcript_to_database().unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(session.status(), err.to_string());
    }

    #[tokio::test]
    async fn test_save_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut session, _rx) = session(vec![MockResponse::text("- a\n- b", 3)]);
        session.set_input("list please");
        session.submit_prompt().unwrap();
        session.wait_idle().await;

        let path = session.save_transcript_to_file(dir.path()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[User]:\nlist please\n\n[AI Assistant]:\n- a\n- b\n\n");
        assert!(session.status().starts_with("Chat log saved to"));
    }

    #[test]
    fn test_save_to_file_failure_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let (mut session, _rx) = session(vec![]);
        let err = session.save_transcript_to_file(&blocker).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_close_rejects_further_submits() {
        let (mut session, _rx) = session(vec![MockResponse::text("late", 1).with_delay(20)]);
        session.set_input("q");
        session.submit_prompt().unwrap();
        session.close();

        assert!(!session.is_busy());
        session.set_input("again");
        assert!(matches!(session.submit_prompt(), Err(Error::SessionClosed)));
        assert_eq!(session.next_outcome().await, None);
    }
}
