//! ug-engine - Upgrade package engine
//!
//! Validates upgrade packages, executes their steps against an installation,
//! and restores the database when an apply fails.

pub mod backup;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod package;
pub(crate) mod process;
pub mod validate;

pub use backup::{DbSnapshot, FileBackup, FileBackupJournal, FileRestoreReport};
pub use error::{ApplyError, ApplyResult, ValidationError};
pub use executor::{execute_step, ExecutionContext};
pub use orchestrator::{
    apply_package, ApplyOptions, CancellationToken, ExecutionSummary, Progress,
};
pub use package::PackageArchive;
pub use validate::{preview_package, validate_package, verify_package_checksum};
