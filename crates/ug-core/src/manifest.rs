//! Upgrade package manifest model and parser.
//!
//! The manifest lives at the root of a package archive as `upgrade.json`:
//!
//! ```json
//! {
//!   "version": "1.1.0",
//!   "description": "Loyalty points",
//!   "min_app_version": "1.0.0",
//!   "steps": [
//!     { "type": "sql", "file": "sql/001.sql" },
//!     { "type": "script", "file": "py/seed.py" },
//!     { "type": "copy", "src": "ui", "dest": "ui" },
//!     { "type": "command", "cmd": "echo done" }
//!   ]
//! }
//! ```
//!
//! Parsing rejects unknown step types and malformed step shapes up front, so
//! the executor only ever sees well-formed [`Step`] values.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the descriptor entry at the archive root.
pub const DESCRIPTOR_NAME: &str = "upgrade.json";

/// Parsed package descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Package version
    pub version: String,

    /// Optional human description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Minimum application version required to apply the package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_app_version: Option<String>,

    /// Ordered upgrade steps
    pub steps: Vec<Step>,
}

/// The part of a manifest reported back in an execution summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub version: String,
    pub description: Option<String>,
}

/// One declared unit of upgrade work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    /// SQL script executed against the target database
    Sql { file: String },

    /// Executable run in a child process
    #[serde(alias = "python")]
    Script {
        file: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },

    /// File or directory materialized into the install directory
    Copy {
        src: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        dest: Option<String>,
    },

    /// Shell command
    Command {
        cmd: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
}

/// Discriminant of a [`Step`], used for logging and progress messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Sql,
    Script,
    Copy,
    Command,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Sql => "sql",
            StepKind::Script => "script",
            StepKind::Copy => "copy",
            StepKind::Command => "command",
        }
    }

    /// Parse a manifest `type` value. `python` is the legacy spelling of
    /// `script`.
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "sql" => Some(StepKind::Sql),
            "script" | "python" => Some(StepKind::Script),
            "copy" => Some(StepKind::Copy),
            "command" => Some(StepKind::Command),
            _ => None,
        }
    }

    /// The key every step of this kind must carry.
    pub fn required_key(self) -> &'static str {
        match self {
            StepKind::Sql | StepKind::Script => "file",
            StepKind::Copy => "src",
            StepKind::Command => "cmd",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Manifest {
    /// Parse and structurally check a descriptor.
    pub fn from_json_slice(bytes: &[u8]) -> CoreResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CoreError::ManifestInvalidJson {
                message: e.to_string(),
            })?;
        let Value::Object(mut root) = value else {
            return Err(CoreError::ManifestNotObject);
        };

        let version = take_field::<String>(&mut root, "version", "a string")?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(CoreError::ManifestMissingField { field: "version" })?;
        let description = take_field(&mut root, "description", "a string")?;
        let min_app_version = take_field(&mut root, "min_app_version", "a string")?;

        // Steps are decoded one at a time so errors can name their position.
        let steps = take_field::<Vec<Value>>(&mut root, "steps", "a list")?
            .ok_or(CoreError::ManifestMissingField { field: "steps" })?
            .into_iter()
            .enumerate()
            .map(|(i, item)| Step::from_value(i + 1, item))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            version,
            description,
            min_app_version,
            steps,
        })
    }

    pub fn summary(&self) -> ManifestSummary {
        ManifestSummary {
            version: self.version.clone(),
            description: self.description.clone(),
        }
    }

    /// Archive entries referenced by steps, with their 1-based step index.
    pub fn archive_references(&self) -> impl Iterator<Item = (usize, &Step, &str)> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| step.archive_reference().map(|path| (i + 1, step, path)))
    }
}

impl Step {
    fn from_value(index: usize, value: Value) -> CoreResult<Self> {
        let Value::Object(obj) = &value else {
            return Err(CoreError::StepNotObject { index });
        };
        let kind = match obj.get("type") {
            Some(Value::String(s)) => {
                StepKind::parse(s).ok_or_else(|| CoreError::StepInvalidType {
                    index,
                    found: s.clone(),
                })?
            }
            Some(other) => {
                return Err(CoreError::StepInvalidType {
                    index,
                    found: other.to_string(),
                })
            }
            None => {
                return Err(CoreError::StepInvalidType {
                    index,
                    found: "<missing>".to_string(),
                })
            }
        };
        let missing = CoreError::StepMissingKey {
            index,
            kind: kind.as_str(),
            key: kind.required_key(),
        };
        if matches!(obj.get(kind.required_key()), None | Some(Value::Null)) {
            return Err(missing);
        }

        let step: Step =
            serde_json::from_value(value).map_err(|e| CoreError::StepInvalidField {
                index,
                message: e.to_string(),
            })?;

        match step {
            Step::Sql { file } => Ok(Step::Sql {
                file: archive_path(index, &file)?.ok_or(missing)?,
            }),
            Step::Script { file, timeout_secs } => Ok(Step::Script {
                file: archive_path(index, &file)?.ok_or(missing)?,
                timeout_secs: positive_timeout(index, timeout_secs)?,
            }),
            Step::Copy { src, dest } => Ok(Step::Copy {
                src: archive_path(index, &src)?.ok_or(missing)?,
                dest: match dest {
                    Some(dest) => archive_path(index, &dest)?,
                    None => None,
                },
            }),
            Step::Command { cmd, .. } if cmd.trim().is_empty() => Err(missing),
            Step::Command { cmd, timeout_secs } => Ok(Step::Command {
                cmd,
                timeout_secs: positive_timeout(index, timeout_secs)?,
            }),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::Sql { .. } => StepKind::Sql,
            Step::Script { .. } => StepKind::Script,
            Step::Copy { .. } => StepKind::Copy,
            Step::Command { .. } => StepKind::Command,
        }
    }

    /// The archive entry this step reads, if any.
    pub fn archive_reference(&self) -> Option<&str> {
        match self {
            Step::Sql { file } | Step::Script { file, .. } => Some(file),
            Step::Copy { src, .. } => Some(src),
            Step::Command { .. } => None,
        }
    }

    /// Per-step timeout override for subprocess steps.
    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            Step::Script { timeout_secs, .. } | Step::Command { timeout_secs, .. } => {
                *timeout_secs
            }
            Step::Sql { .. } | Step::Copy { .. } => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Sql { file } => write!(f, "sql: {file}"),
            Step::Script { file, .. } => write!(f, "script: {file}"),
            Step::Copy { src, dest } => {
                write!(f, "copy: {src} -> {}", dest.as_deref().unwrap_or(src))
            }
            Step::Command { cmd, .. } => write!(f, "command: {cmd}"),
        }
    }
}

/// Normalize a package-relative path as written in a manifest.
///
/// Strips a leading `./` and trailing `/`, converts backslashes, and rejects
/// empty, absolute, and parent-escaping paths.
pub fn normalize_archive_path(raw: &str) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    let stripped = unified.strip_prefix("./").unwrap_or(&unified);
    let stripped = stripped.trim_end_matches('/');

    if stripped.is_empty() || stripped.starts_with('/') || stripped.contains(':') {
        return None;
    }
    if stripped.split('/').any(|part| part == ".." || part.is_empty()) {
        return None;
    }
    Some(stripped.to_string())
}

/// Remove `field` from the descriptor root and decode it. Absent and `null`
/// both read as `None`.
fn take_field<T: DeserializeOwned>(
    root: &mut Map<String, Value>,
    field: &'static str,
    expected: &'static str,
) -> CoreResult<Option<T>> {
    match root.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|_| CoreError::ManifestInvalidField { field, expected }),
    }
}

/// Blank paths read as absent; anything else must normalize cleanly.
fn archive_path(index: usize, raw: &str) -> CoreResult<Option<String>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    normalize_archive_path(raw)
        .map(Some)
        .ok_or_else(|| CoreError::StepUnsafePath {
            index,
            path: raw.to_string(),
        })
}

fn positive_timeout(index: usize, timeout_secs: Option<u64>) -> CoreResult<Option<u64>> {
    match timeout_secs {
        Some(0) => Err(CoreError::StepInvalidTimeout { index }),
        other => Ok(other),
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod tests;
