use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::controller::{SessionController, SessionOptions};
use crate::events::{RequestOutcome, SessionId, SessionUpdate};
use chatdesk_providers::ModelClient;
use chatdesk_store::{RecordStore, TranscriptArchive};

/// The set of open conversations, one of which is active
///
/// Always holds at least one conversation.
pub struct ConversationManager {
    sessions: Vec<SessionController>,
    active: SessionId,
    created: u64,
    client: ModelClient,
    store: Arc<RecordStore>,
    options: SessionOptions,
    events: UnboundedSender<SessionUpdate>,
}

impl ConversationManager {
    /// Create the manager with "Conversation #1" open
    pub fn new(
        client: ModelClient, store: Arc<RecordStore>, options: SessionOptions, events: UnboundedSender<SessionUpdate>,
    ) -> Self {
        let mut manager =
            Self { sessions: Vec::new(), active: SessionId(0), created: 0, client, store, options, events };
        manager.new_conversation();
        manager
    }

    /// Open a new conversation and make it active
    pub fn new_conversation(&mut self) -> SessionId {
        self.created += 1;
        let id = SessionId(self.created);
        let title = format!("Conversation #{}", self.created);

        let session = SessionController::new(
            id,
            title,
            self.client.clone(),
            TranscriptArchive::new(Arc::clone(&self.store)),
            self.events.clone(),
            self.options,
        );
        self.sessions.push(session);
        self.active = id;
        tracing::debug!(session = %id, "conversation opened");
        id
    }

    /// Close `id`, cancelling its request in flight.
    ///
    /// Returns `false` for an unknown id or when `id` is the only conversation.
    pub fn close_conversation(&mut self, id: SessionId) -> bool {
        if self.sessions.len() <= 1 {
            return false;
        }
        let Some(index) = self.sessions.iter().position(|s| s.id() == id) else {
            return false;
        };

        let mut session = self.sessions.remove(index);
        session.close();

        if self.active == id {
            let next = index.min(self.sessions.len() - 1);
            self.active = self.sessions[next].id();
        }
        tracing::debug!(session = %id, active = %self.active, "conversation closed");
        true
    }

    fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }

    pub fn active_id(&self) -> SessionId {
        self.active
    }

    pub fn active(&self) -> &SessionController {
        let index = self.position(self.active).unwrap_or(0);
        &self.sessions[index]
    }

    pub fn active_mut(&mut self) -> &mut SessionController {
        let index = self.position(self.active).unwrap_or(0);
        &mut self.sessions[index]
    }

    pub fn set_active(&mut self, id: SessionId) -> bool {
        if self.position(id).is_some() {
            self.active = id;
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionController> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut SessionController> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    /// Open conversations in creation order
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(SessionController::id).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionController> {
        self.sessions.iter()
    }

    /// Apply finished requests in every conversation
    pub fn poll_all(&mut self) -> Vec<(SessionId, RequestOutcome)> {
        let mut outcomes = Vec::new();
        for session in &mut self.sessions {
            let id = session.id();
            outcomes.extend(session.poll_outcomes().into_iter().map(|o| (id, o)));
        }
        outcomes
    }

    /// Cancel every request in flight
    pub fn shutdown(&mut self) {
        for session in &mut self.sessions {
            session.close();
        }
        tracing::debug!(sessions = self.sessions.len(), "conversations shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_providers::{MockProvider, RetryConfig};
    use tokio::sync::mpsc;

    fn manager() -> ConversationManager {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = ModelClient::new(Arc::new(MockProvider::default()), RetryConfig::single_attempt());
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        ConversationManager::new(client, store, SessionOptions::default(), tx)
    }

    #[test]
    fn test_starts_with_one_conversation() {
        let manager = manager();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.active().title(), "Conversation #1");
    }

    #[test]
    fn test_titles_never_reuse_numbers() {
        let mut manager = manager();
        let second = manager.new_conversation();
        assert!(manager.close_conversation(second));

        let third = manager.new_conversation();
        assert_eq!(manager.get(third).unwrap().title(), "Conversation #3");
        assert_eq!(manager.active_id(), third);
    }

    #[test]
    fn test_last_conversation_cannot_be_closed() {
        let mut manager = manager();
        let only = manager.active_id();
        assert!(!manager.close_conversation(only));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_closing_active_selects_neighbour() {
        let mut manager = manager();
        let first = manager.active_id();
        let second = manager.new_conversation();
        let third = manager.new_conversation();

        assert!(manager.set_active(second));
        assert!(manager.close_conversation(second));
        assert_eq!(manager.active_id(), third);

        assert!(manager.close_conversation(third));
        assert_eq!(manager.active_id(), first);
        assert_eq!(manager.ids(), vec![first]);
    }

    #[test]
    fn test_unknown_ids() {
        let mut manager = manager();
        manager.new_conversation();
        assert!(!manager.set_active(SessionId(99)));
        assert!(!manager.close_conversation(SessionId(99)));
        assert!(manager.get(SessionId(99)).is_none());
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let mut manager = manager();
        manager.new_conversation();
        manager.shutdown();
        assert!(manager.iter().all(SessionController::is_closed));
    }
}
