//! SQLite database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::Database;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// How long a statement waits on a lock held by another process (for
/// example a script step's own connection) before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database backend
///
/// Statements run in autocommit mode so that a child process started by a
/// later step sees the effects of earlier `sql` steps.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) the SQLite database file at `path`
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        log::debug!("Opened database {}", path.display());
        Ok(Self { conn })
    }

    /// Close the connection, releasing the file handle before any restore.
    pub fn close(self) -> DbResult<()> {
        self.conn
            .close()
            .map_err(|(_, e)| DbError::ConnectionError(format!("close failed: {e}")))
    }
}

impl Database for SqliteBackend {
    fn execute_script(&self, sql: &str) -> DbResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DbError::ExecutionError(e.to_string()))
    }

    fn list_tables(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn finish(&self) -> DbResult<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        log::debug!("Committing transaction left open by a SQL script");
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| DbError::TransactionError(format!("COMMIT failed: {e}")))
    }

    fn abort(&self) -> DbResult<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| DbError::TransactionError(format!("ROLLBACK failed: {e}")))
    }

    fn db_type(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;
