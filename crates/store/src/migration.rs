//! Versioned schema steps for the record store.
//!
//! Each step runs in its own transaction together with the `schema_version`
//! row that records it, so a failed step leaves the previous version intact.

use crate::error::{Error, Result};
use crate::schema::{MESSAGE_LOGS_TABLE, SCHEMA_VERSION, SCHEMA_VERSION_SQL, message_logs_schema};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// One schema step: the version it produces and the SQL that produces it
struct Step {
    version: i32,
    sql: fn() -> Result<String>,
}

fn v1_message_logs() -> Result<String> {
    Ok(format!("{};", message_logs_schema().create_sql(MESSAGE_LOGS_TABLE)?))
}

const STEPS: &[Step] = &[Step { version: 1, sql: v1_message_logs }];

pub struct MigrationManager;

impl MigrationManager {
    /// Highest applied version; 0 for a database that was never migrated
    pub fn get_current_version(conn: &Connection) -> Result<i32> {
        let tracked = conn
            .query_row("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'", [], |row| {
                row.get::<_, String>(0)
            })
            .optional()?
            .is_some();
        if !tracked {
            return Ok(0);
        }

        let version: Option<i32> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
        Ok(version.unwrap_or(0))
    }

    /// Bring `conn` up to [`SCHEMA_VERSION`]
    pub fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_VERSION_SQL)?;
        let current = Self::get_current_version(conn)?;
        if current > SCHEMA_VERSION {
            return Err(Error::database(format!(
                "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
            )));
        }

        let pending: Vec<&Step> = STEPS.iter().filter(|s| s.version > current).collect();
        if pending.is_empty() {
            debug!(version = current, "schema up to date");
            return Ok(());
        }

        for step in pending {
            let sql = (step.sql)()?;
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(&sql)
                .map_err(|e| Error::database(format!("schema step v{} failed: {e}", step.version)))?;
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [step.version])?;
            tx.commit()?;
            info!(version = step.version, "schema step applied");
        }
        Ok(())
    }
}
