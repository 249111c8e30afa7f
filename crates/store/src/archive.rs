//! Transcript archive on the `message_logs` table.

use crate::error::{Error, Result};
use crate::record_store::{Filter, Record, RecordStore, Row};
use crate::schema::{MESSAGE_LOGS_TABLE, message_logs_schema};

use chatdesk_core::ContextEntry;
use chrono::{DateTime, Local};
use std::sync::Arc;

/// strftime pattern of `PersistedRecord::created_time`
pub const CREATED_TIME_FORMAT: &str = "%Y-%m-%d, %H:%M:%S";

/// One archived conversation as written to `message_logs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    /// JSON array of `{role, content}`
    pub messages: String,
    pub created_time: String,
}

impl PersistedRecord {
    pub fn from_context(context: &[ContextEntry], at: DateTime<Local>) -> Result<Self> {
        Ok(Self { messages: serde_json::to_string(context)?, created_time: at.format(CREATED_TIME_FORMAT).to_string() })
    }

    pub fn entries(&self) -> Result<Vec<ContextEntry>> {
        Ok(serde_json::from_str(&self.messages)?)
    }
}

/// A row read back from the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedTranscript {
    pub id: i64,
    pub record: PersistedRecord,
}

impl TryFrom<Row> for ArchivedTranscript {
    type Error = Error;

    fn try_from(row: Row) -> Result<Self> {
        let id = row
            .get_integer("message_log_no")
            .ok_or_else(|| Error::database("message_logs row without message_log_no"))?;
        let messages = row.get_text("messages").unwrap_or_default().to_string();
        let created_time = row.get_text("created").unwrap_or_default().to_string();
        Ok(Self { id, record: PersistedRecord { messages, created_time } })
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptArchive {
    store: Arc<RecordStore>,
}

impl TranscriptArchive {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn ensure_table(&self) -> Result<()> {
        self.store.create_table_if_absent(MESSAGE_LOGS_TABLE, &message_logs_schema())
    }

    /// Append `record`, creating the table first if needed
    pub fn insert(&self, record: &PersistedRecord) -> Result<i64> {
        self.ensure_table()?;
        let row = Record::new()
            .with("messages", record.messages.as_str())
            .with("created", record.created_time.as_str());
        let id = self.store.append(MESSAGE_LOGS_TABLE, &row)?;
        tracing::info!(id, bytes = record.messages.len(), "transcript archived");
        Ok(id)
    }

    /// Every archived transcript, oldest first
    pub fn list(&self) -> Result<Vec<ArchivedTranscript>> {
        self.ensure_table()?;
        self.store
            .query(MESSAGE_LOGS_TABLE, &Filter::All)?
            .into_iter()
            .map(ArchivedTranscript::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_core::Role;
    use chrono::TimeZone;

    fn context() -> Vec<ContextEntry> {
        vec![
            ContextEntry { role: Role::User, content: "Hello".to_string() },
            ContextEntry { role: Role::Assistant, content: "Hi **there**".to_string() },
        ]
    }

    #[test]
    fn test_record_layout() {
        let at = Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let record = PersistedRecord::from_context(&context(), at).unwrap();
        assert_eq!(record.created_time, "2024-05-06, 07:08:09");
        assert_eq!(
            record.messages,
            r#"[{"role":"user","content":"Hello"},{"role":"assistant","content":"Hi **there**"}]"#
        );
        assert_eq!(record.entries().unwrap(), context());
    }

    #[test]
    fn test_insert_and_list_in_order() {
        let archive = TranscriptArchive::new(Arc::new(RecordStore::open_in_memory().unwrap()));
        let at = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let first = archive.insert(&PersistedRecord::from_context(&context(), at).unwrap()).unwrap();
        let second = archive.insert(&PersistedRecord::from_context(&context()[..1], at).unwrap()).unwrap();
        assert_eq!((first, second), (1, 2));

        let listed = archive.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, 1);
        assert_eq!(listed[0].record.entries().unwrap().len(), 2);
        assert_eq!(listed[1].record.entries().unwrap().len(), 1);
        assert_eq!(listed[1].record.created_time, "2024-01-01, 12:00:00");
    }

    #[test]
    fn test_empty_transcript_is_archived() {
        let archive = TranscriptArchive::new(Arc::new(RecordStore::open_in_memory().unwrap()));
        archive.insert(&PersistedRecord::from_context(&[], Local::now()).unwrap()).unwrap();
        assert_eq!(archive.list().unwrap()[0].record.messages, "[]");
    }

    #[test]
    fn test_insert_after_close_fails() {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let archive = TranscriptArchive::new(Arc::clone(&store));
        store.close().unwrap();

        let err = archive.insert(&PersistedRecord::from_context(&context(), Local::now()).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Closed));
    }
}
