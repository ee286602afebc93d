//! Error types for ug-core

use thiserror::Error;

/// Core error type for manifest parsing and configuration
#[derive(Error, Debug)]
pub enum CoreError {
    /// M001: Descriptor is not valid JSON
    #[error("[M001] Invalid JSON in manifest: {message}")]
    ManifestInvalidJson { message: String },

    /// M002: Descriptor root is not a JSON object
    #[error("[M002] Manifest must be a JSON object")]
    ManifestNotObject,

    /// M003: Required top-level field missing
    #[error("[M003] Manifest missing required '{field}' field")]
    ManifestMissingField { field: &'static str },

    /// M004: Top-level field has the wrong shape
    #[error("[M004] Manifest field '{field}' must be {expected}")]
    ManifestInvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// M005: Step entry is not an object
    #[error("[M005] Step #{index} must be an object")]
    StepNotObject { index: usize },

    /// M006: Unknown or missing step type
    #[error("[M006] Step #{index} has invalid type '{found}'")]
    StepInvalidType { index: usize, found: String },

    /// M007: Step is missing a key its type requires
    #[error("[M007] Step #{index} of type '{kind}' must specify '{key}'")]
    StepMissingKey {
        index: usize,
        kind: &'static str,
        key: &'static str,
    },

    /// M008: Step path is absolute or escapes the package root
    #[error("[M008] Step #{index} references unsafe path '{path}'")]
    StepUnsafePath { index: usize, path: String },

    /// M009: Step timeout is not a positive integer
    #[error("[M009] Step #{index} has invalid 'timeout_secs': expected a positive integer")]
    StepInvalidTimeout { index: usize },

    /// M010: Step field has the wrong JSON type
    #[error("[M010] Step #{index} is malformed: {message}")]
    StepInvalidField { index: usize, message: String },

    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// C003: Invalid configuration value
    #[error("[C003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C004: IO error with file path context
    #[error("[C004] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
