//! SQLite persistence for chatdesk
//!
//! A [`RecordStore`] is opened once per process and shared as
//! `Arc<RecordStore>`. [`TranscriptArchive`] stores whole conversations in the
//! `message_logs` table.
//!
//! # Example
//!
//! ```no_run
//! use chatdesk_store::{PersistedRecord, RecordStore, TranscriptArchive};
//! use std::sync::Arc;
//!
//! let store = Arc::new(RecordStore::open(std::path::Path::new("chatdesk.db"))?);
//! let archive = TranscriptArchive::new(Arc::clone(&store));
//! archive.insert(&PersistedRecord::from_context(&[], chrono::Local::now())?)?;
//! for entry in archive.list()? {
//!     println!("#{} {}", entry.id, entry.record.created_time);
//! }
//! store.close()?;
//! # Ok::<(), chatdesk_store::Error>(())
//! ```

mod archive;
mod error;
mod migration;
mod record_store;
mod schema;

pub use archive::{ArchivedTranscript, CREATED_TIME_FORMAT, PersistedRecord, TranscriptArchive};
pub use error::{Error, Result};
pub use migration::MigrationManager;
pub use record_store::{Filter, Record, RecordStore, Row, Value};
pub use schema::{
    Column, ColumnType, MESSAGE_LOGS_TABLE, SCHEMA_VERSION, TableSchema, message_logs_schema, validate_identifier,
};
