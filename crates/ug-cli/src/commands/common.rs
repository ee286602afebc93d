//! Shared utilities for CLI commands

use std::fmt;

/// Package file does not exist
pub(crate) const EXIT_PACKAGE_NOT_FOUND: i32 = 2;

/// The upgrade was attempted and failed (or was rejected by validation)
pub(crate) const EXIT_APPLY_FAILED: i32 = 3;

/// Any other error during the invocation
pub(crate) const EXIT_UNHANDLED: i32 = 4;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Empty: ExitCode only carries control flow. If main's downcast ever
        // misses it, "exit code N" must not leak into stderr.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}
