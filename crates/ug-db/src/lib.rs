//! ug-db - Target database layer for the upgrade engine
//!
//! This crate provides the `Database` trait the step executor runs SQL
//! through, and its SQLite implementation for the application's database
//! file.

pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::{DbError, DbResult};
pub use sqlite::SqliteBackend;
pub use traits::Database;
