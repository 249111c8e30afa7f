//! Append-only record store over a single SQLite connection.
//!
//! All operations are synchronous and run while holding the connection mutex,
//! so writes from different sessions are applied one at a time. Table and
//! column names are checked against [`validate_identifier`] before they are
//! interpolated; values are always bound as parameters.

use crate::error::{Error, Result};
use crate::migration::MigrationManager;
use crate::schema::{TableSchema, validate_identifier};

use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Real(f) => SqlValue::Real(*f),
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Blob(b) => SqlValue::Blob(b.clone()),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

/// Column values for one insert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One stored row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub row_id: i64,
    pub values: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    pub fn get_text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_text)
    }

    pub fn get_integer(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_integer)
    }
}

/// Row selection for [`RecordStore::query`]
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }
}

/// Process-wide handle to the database
#[derive(Debug)]
pub struct RecordStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl RecordStore {
    /// Open (or create) the database at `path` and apply migrations
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        MigrationManager::migrate(&conn)?;
        info!("record store opened");

        Ok(Self { conn: Mutex::new(Some(conn)), path: Some(path.to_path_buf()) })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        MigrationManager::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(Some(conn)), path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        f(conn)
    }

    /// Create `table` unless a table with that name already exists
    pub fn create_table_if_absent(&self, table: &str, schema: &TableSchema) -> Result<()> {
        let sql = schema.create_sql(table)?;
        self.with_conn(|conn| {
            conn.execute(&sql, [])?;
            debug!(table, columns = schema.columns.len(), "table ensured");
            Ok(())
        })
    }

    /// Insert one row, returning its row id
    pub fn append(&self, table: &str, record: &Record) -> Result<i64> {
        validate_identifier(table)?;
        for (column, _) in &record.fields {
            validate_identifier(column)?;
        }

        let sql = if record.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let columns: Vec<&str> = record.fields.iter().map(|(c, _)| c.as_str()).collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
            format!("INSERT INTO {table} ({}) VALUES ({})", columns.join(", "), placeholders.join(", "))
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.execute(rusqlite::params_from_iter(record.fields.iter().map(|(_, v)| SqlValue::from(v))))?;
            let row_id = conn.last_insert_rowid();
            debug!(table, row_id, "record appended");
            Ok(row_id)
        })
    }

    /// Rows matching `filter`, in insertion order
    pub fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>> {
        validate_identifier(table)?;

        let (clause, params) = match filter {
            Filter::All => (String::new(), Vec::new()),
            Filter::Eq(column, value) => {
                validate_identifier(column)?;
                (format!(" WHERE {column} = ?1"), vec![SqlValue::from(value)])
            }
        };
        let sql = format!("SELECT rowid AS row_id__, * FROM {table}{clause} ORDER BY rowid");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().skip(1).map(String::from).collect();
            let width = names.len();

            let raw = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    let row_id: i64 = row.get(0)?;
                    let mut values = Vec::with_capacity(width);
                    for i in 0..width {
                        values.push(Value::from(row.get_ref(i + 1)?));
                    }
                    Ok((row_id, values))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(raw
                .into_iter()
                .map(|(row_id, values)| Row { row_id, values: names.iter().cloned().zip(values).collect() })
                .collect())
        })
    }

    /// Close the connection; later calls fail with [`Error::Closed`]
    pub fn close(&self) -> Result<()> {
        let conn = self.lock().take().ok_or(Error::Closed)?;
        conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        info!("record store closed");
        Ok(())
    }
}
