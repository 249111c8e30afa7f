//! Append-only conversation transcript.
//!
//! A [`Transcript`] is owned by exactly one session and is the only handle that
//! can append. Readers get a [`TranscriptView`], which takes a snapshot under a
//! read lock so rendering never observes a half-written append.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Position of a message within its transcript
pub type SequenceIndex = u64;

/// Author of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Label shown above the message in the conversation view
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "[User]:",
            Role::Assistant => "[AI Assistant]:",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Text sent to or returned by the model (user prompt trimmed, markup intact)
    pub content: String,
    /// Display form: HTML for assistant messages, the input as typed for user messages
    pub rendered: String,
    /// Total tokens reported for the exchange (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<u32>,
    pub sequence_index: SequenceIndex,
}

/// The `{role, content}` pair sent to the model as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ContextEntry {
    fn from(message: &Message) -> Self {
        Self { role: message.role, content: message.content.clone() }
    }
}

type Shared = Arc<RwLock<Vec<Message>>>;

fn read(inner: &Shared) -> RwLockReadGuard<'_, Vec<Message>> {
    inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(inner: &Shared) -> RwLockWriteGuard<'_, Vec<Message>> {
    inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owning handle for one conversation's messages
#[derive(Debug, Default)]
pub struct Transcript {
    inner: Shared,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn
    pub fn append_user(&mut self, content: impl Into<String>) -> Message {
        let content = content.into();
        self.append(Role::User, content.clone(), content, None)
    }

    /// Append an assistant turn with its rendered form and token usage
    pub fn append_assistant(
        &mut self, content: impl Into<String>, rendered: impl Into<String>, token_usage: Option<u32>,
    ) -> Message {
        self.append(Role::Assistant, content.into(), rendered.into(), token_usage)
    }

    /// Append a message, assigning the next sequence index
    pub fn append(&mut self, role: Role, content: String, rendered: String, token_usage: Option<u32>) -> Message {
        let mut messages = write(&self.inner);
        let sequence_index = messages.len() as SequenceIndex;
        let message = Message { role, content, rendered, token_usage, sequence_index };
        messages.push(message.clone());
        tracing::trace!(role = %role, sequence_index, "transcript append");
        message
    }

    /// Read-only handle that can be shared with other threads
    pub fn view(&self) -> TranscriptView {
        TranscriptView { inner: Arc::clone(&self.inner) }
    }

    pub fn all(&self) -> Vec<Message> {
        read(&self.inner).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }

    pub fn last(&self) -> Option<Message> {
        read(&self.inner).last().cloned()
    }

    /// Snapshot of the conversation as model context
    pub fn context(&self) -> Vec<ContextEntry> {
        read(&self.inner).iter().map(ContextEntry::from).collect()
    }
}

/// Cloneable read-only view of a [`Transcript`]
#[derive(Debug, Clone)]
pub struct TranscriptView {
    inner: Shared,
}

impl TranscriptView {
    pub fn all(&self) -> Vec<Message> {
        read(&self.inner).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }

    pub fn last(&self) -> Option<Message> {
        read(&self.inner).last().cloned()
    }

    pub fn context(&self) -> Vec<ContextEntry> {
        read(&self.inner).iter().map(ContextEntry::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_indices_are_monotonic() {
        let mut transcript = Transcript::new();
        let first = transcript.append_user("Hello");
        let second = transcript.append_assistant("Hi **there**", "<p>Hi <strong>there</strong></p>", Some(12));
        let third = transcript.append_user("Bye");

        assert_eq!(first.sequence_index, 0);
        assert_eq!(second.sequence_index, 1);
        assert_eq!(third.sequence_index, 2);
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn test_user_message_rendered_is_raw() {
        let mut transcript = Transcript::new();
        let msg = transcript.append_user("*not markup*");
        assert_eq!(msg.rendered, "*not markup*");
        assert_eq!(msg.token_usage, None);
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn test_context_uses_raw_content() {
        let mut transcript = Transcript::new();
        transcript.append_user("Q");
        transcript.append_assistant("**A**", "<p><strong>A</strong></p>", Some(5));

        let context = transcript.context();
        assert_eq!(
            context,
            vec![
                ContextEntry { role: Role::User, content: "Q".to_string() },
                ContextEntry { role: Role::Assistant, content: "**A**".to_string() },
            ]
        );
    }

    #[test]
    fn test_view_snapshot_is_detached() {
        let mut transcript = Transcript::new();
        let view = transcript.view();
        transcript.append_user("one");

        let snapshot = view.all();
        transcript.append_user("two");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(view.len(), 2);
        assert_eq!(view.last().map(|m| m.content), Some("two".to_string()));
    }

    #[test]
    fn test_concurrent_reads_during_appends() {
        let mut transcript = Transcript::new();
        let view = transcript.view();

        let reader = std::thread::spawn(move || {
            for _ in 0..1000 {
                let snapshot = view.all();
                for (i, msg) in snapshot.iter().enumerate() {
                    assert_eq!(msg.sequence_index, i as u64);
                }
            }
        });

        for i in 0..500 {
            transcript.append_user(format!("message {i}"));
        }

        reader.join().unwrap();
        assert_eq!(transcript.len(), 500);
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::User.label(), "[User]:");
        assert_eq!(Role::Assistant.label(), "[AI Assistant]:");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
