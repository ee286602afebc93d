//! Error types for ug-engine
//!
//! [`ValidationError`] is raised before anything is mutated and reaches the
//! caller unchanged. [`ApplyError`] is raised while a package is being
//! applied; the orchestrator catches it, restores the database, and reports
//! it in the execution summary.

use thiserror::Error;
use ug_core::CoreError;
use ug_db::DbError;

/// Package validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    /// V001: Package file does not exist
    #[error("[V001] Package not found: {path}")]
    PackageNotFound { path: String },

    /// V002: Package is not a readable archive
    #[error("[V002] Failed to open package '{path}': {message}")]
    Archive { path: String, message: String },

    /// V003: Archive has no descriptor entry
    #[error("[V003] Package missing required '{name}' manifest")]
    MissingDescriptor { name: &'static str },

    /// Descriptor is malformed
    #[error(transparent)]
    Manifest(#[from] CoreError),

    /// V004: Step references a file the archive does not contain
    #[error("[V004] Step #{index} references missing file '{path}'")]
    MissingReference { index: usize, path: String },

    /// V005: Running application is older than the package requires
    #[error("[V005] Package requires app version {required}+, current is {current}")]
    AppVersionTooLow { required: String, current: String },

    /// V006: Package digest differs from the expected one
    #[error("[V006] Package checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// V007: IO error while reading the package
    #[error("[V007] Failed to read package '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Errors raised while applying a validated package
#[derive(Error, Debug)]
pub enum ApplyError {
    /// A001: Archive extraction failed
    #[error("[A001] Failed to extract package: {message}")]
    Extract { message: String },

    /// A002: Database snapshot could not be taken
    #[error("[A002] Failed to back up database '{path}': {source}")]
    Backup {
        path: String,
        source: std::io::Error,
    },

    /// A003: Target database could not be opened
    #[error("[A003] Failed to open database: {0}")]
    Database(DbError),

    /// A004: A bundled file could not be read
    #[error("[A004] Failed to read '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// A005: SQL script failed
    #[error("[A005] SQL step failed ({file}): {source}")]
    Sql { file: String, source: DbError },

    /// A006: Script exited non-zero
    #[error("[A006] Script '{file}' failed with exit {exit}: {stderr}")]
    ScriptFailed {
        file: String,
        exit: String,
        stderr: String,
    },

    /// A007: Command exited non-zero
    #[error("[A007] Command '{cmd}' failed with exit {exit}: {stderr}")]
    CommandFailed {
        cmd: String,
        exit: String,
        stderr: String,
    },

    /// A008: Subprocess exceeded its timeout
    #[error("[A008] {what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    /// A009: Subprocess could not be started or waited on
    #[error("[A009] Failed to run {what}: {source}")]
    Spawn {
        what: String,
        source: std::io::Error,
    },

    /// A010: File copy into the install directory failed
    #[error("[A010] Failed to copy '{src}' to '{dest}': {source}")]
    Copy {
        src: String,
        dest: String,
        source: std::io::Error,
    },

    /// A011: Final commit failed
    #[error("[A011] Failed to commit database changes: {0}")]
    Commit(DbError),

    /// A012: Install or scratch directory could not be prepared
    #[error("[A012] Failed to prepare '{path}': {source}")]
    Workspace {
        path: String,
        source: std::io::Error,
    },
}

/// Result type alias for ApplyError
pub type ApplyResult<T> = Result<T, ApplyError>;
