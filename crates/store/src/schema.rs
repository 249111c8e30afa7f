//! Table definitions and identifier rules.

use crate::error::{Error, Result};
use std::collections::HashSet;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create the schema version table
pub const SCHEMA_VERSION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Archived transcripts
pub const MESSAGE_LOGS_TABLE: &str = "message_logs";

/// `message_logs (message_log_no INTEGER PRIMARY KEY AUTOINCREMENT, messages TEXT, created TEXT)`
pub fn message_logs_schema() -> TableSchema {
    TableSchema::new(vec![
        Column::new("message_log_no", ColumnType::Integer).primary_key(),
        Column::new("messages", ColumnType::Text),
        Column::new("created", ColumnType::Text),
    ])
}

/// Reject anything outside `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid { Ok(name) } else { Err(Error::InvalidIdentifier(name.to_string())) }
}

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`
    pub primary_key: bool,
    pub not_null: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self { name: name.into(), column_type, primary_key: false, not_null: false }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// Ordered column list for [`crate::RecordStore::create_table_if_absent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn validate(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;

        if self.columns.is_empty() {
            return Err(Error::malformed_schema(table, "no columns"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(Error::malformed_schema(table, format!("duplicate column {}", column.name)));
            }
            if column.primary_key && column.column_type != ColumnType::Integer {
                return Err(Error::malformed_schema(
                    table,
                    format!("primary key {} must be INTEGER", column.name),
                ));
            }
        }

        if self.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::malformed_schema(table, "more than one primary key"));
        }

        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for `table`
    pub fn create_sql(&self, table: &str) -> Result<String> {
        self.validate(table)?;

        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", c.name, c.column_type.as_sql());
                if c.primary_key {
                    def.push_str(" PRIMARY KEY AUTOINCREMENT");
                }
                if c.not_null {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        Ok(format!("CREATE TABLE IF NOT EXISTS {} ({})", table, columns.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("message_logs").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("T2").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("logs; DROP TABLE x").is_err());
        assert!(validate_identifier("naïve").is_err());
        assert!(validate_identifier("a-b").is_err());
    }

    #[test]
    fn test_message_logs_sql() {
        let sql = message_logs_schema().create_sql(MESSAGE_LOGS_TABLE).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS message_logs \
             (message_log_no INTEGER PRIMARY KEY AUTOINCREMENT, messages TEXT, created TEXT)"
        );
    }

    #[test]
    fn test_malformed_schemas() {
        let empty = TableSchema::new(vec![]);
        assert!(matches!(empty.validate("t"), Err(Error::MalformedSchema { .. })));

        let duplicate = TableSchema::new(vec![
            Column::new("a", ColumnType::Text),
            Column::new("A", ColumnType::Integer),
        ]);
        assert!(matches!(duplicate.validate("t"), Err(Error::MalformedSchema { .. })));

        let text_key = TableSchema::new(vec![Column::new("id", ColumnType::Text).primary_key()]);
        assert!(matches!(text_key.validate("t"), Err(Error::MalformedSchema { .. })));

        let two_keys = TableSchema::new(vec![
            Column::new("a", ColumnType::Integer).primary_key(),
            Column::new("b", ColumnType::Integer).primary_key(),
        ]);
        assert!(matches!(two_keys.validate("t"), Err(Error::MalformedSchema { .. })));

        let bad_column = TableSchema::new(vec![Column::new("x y", ColumnType::Text)]);
        assert!(matches!(bad_column.validate("t"), Err(Error::InvalidIdentifier(_))));

        let ok = TableSchema::new(vec![Column::new("x", ColumnType::Text)]);
        assert!(matches!(ok.validate("bad name"), Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn test_not_null_column() {
        let schema = TableSchema::new(vec![Column::new("body", ColumnType::Text).not_null()]);
        assert_eq!(schema.create_sql("notes").unwrap(), "CREATE TABLE IF NOT EXISTS notes (body TEXT NOT NULL)");
    }
}
