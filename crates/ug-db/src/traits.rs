//! Database trait definition

use crate::error::DbResult;

/// Target database abstraction used by the step executor.
///
/// Calls are synchronous; one apply holds one connection for its duration.
pub trait Database {
    /// Execute a multi-statement SQL script
    fn execute_script(&self, sql: &str) -> DbResult<()>;

    /// Names of user tables, sorted
    fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Commit any transaction a script left open
    fn finish(&self) -> DbResult<()>;

    /// Roll back any transaction a script left open
    fn abort(&self) -> DbResult<()>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
