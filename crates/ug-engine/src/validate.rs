//! Package validation.
//!
//! Validation is a pure read of the archive: it never extracts, never
//! creates scratch directories, and never touches the database or the
//! install directory.

use crate::error::ValidationError;
use crate::package::PackageArchive;
use std::path::Path;
use ug_core::{compute_file_checksum, meets_minimum, Manifest, Step, StepKind};

/// Validate a package and return its manifest.
///
/// When both `current_version` and the manifest's `min_app_version` are
/// present they are compared numerically; a malformed version on either side
/// skips the check with a warning.
pub fn validate_package(
    path: &Path,
    current_version: Option<&str>,
) -> Result<Manifest, ValidationError> {
    let mut archive = PackageArchive::open(path)?;
    let manifest = Manifest::from_json_slice(&archive.read_descriptor()?)?;

    if let (Some(current), Some(required)) = (current_version, manifest.min_app_version.as_deref())
    {
        match meets_minimum(current, required) {
            Some(true) => {}
            Some(false) => {
                return Err(ValidationError::AppVersionTooLow {
                    required: required.to_string(),
                    current: current.to_string(),
                })
            }
            None => log::warn!(
                "Could not compare versions: current={current}, required={required}; skipping check"
            ),
        }
    }

    for (index, step, reference) in manifest.archive_references() {
        let present = match step.kind() {
            StepKind::Copy => archive.contains_path(reference),
            StepKind::Sql | StepKind::Script | StepKind::Command => {
                archive.contains_file(reference)
            }
        };
        if !present {
            return Err(ValidationError::MissingReference {
                index,
                path: reference.to_string(),
            });
        }
    }

    log::debug!(
        "Validated {} (version {}, {} step(s), {} file(s))",
        archive.path().display(),
        manifest.version,
        manifest.steps.len(),
        archive.file_count()
    );
    Ok(manifest)
}

/// Validate a package and return its ordered step list.
pub fn preview_package(path: &Path) -> Result<Vec<Step>, ValidationError> {
    Ok(validate_package(path, None)?.steps)
}

/// Compare the SHA-256 of the package file with an expected hex digest.
pub fn verify_package_checksum(path: &Path, expected: &str) -> Result<(), ValidationError> {
    if !path.is_file() {
        return Err(ValidationError::PackageNotFound {
            path: path.display().to_string(),
        });
    }
    let actual = compute_file_checksum(path).map_err(|e| ValidationError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let expected = expected.trim().to_ascii_lowercase();
    if actual != expected {
        return Err(ValidationError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
