//! ug-core - Core library for the upgrade engine
//!
//! This crate provides the upgrade package manifest model and its parser,
//! application version comparison, engine configuration, and checksum
//! helpers shared by the engine and the CLI.

pub mod checksum;
pub mod config;
pub mod error;
pub mod manifest;
pub(crate) mod serde_helpers;
pub mod version;

pub use checksum::{compute_checksum, compute_file_checksum};
pub use config::UpgradeConfig;
pub use error::{CoreError, CoreResult};
pub use manifest::{
    normalize_archive_path, Manifest, ManifestSummary, Step, StepKind, DESCRIPTOR_NAME,
};
pub use version::{compare_versions, meets_minimum};
