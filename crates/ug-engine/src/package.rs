//! Read-only access to an upgrade package archive.

use crate::error::{ApplyError, ApplyResult, ValidationError};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use ug_core::{normalize_archive_path, DESCRIPTOR_NAME};
use zip::result::ZipError;
use zip::ZipArchive;

/// An opened package archive with its entry names indexed.
pub struct PackageArchive {
    path: PathBuf,
    archive: ZipArchive<File>,
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
}

impl PackageArchive {
    /// Open a package for reading. Never writes to the package.
    pub fn open(path: &Path) -> Result<Self, ValidationError> {
        if !path.is_file() {
            return Err(ValidationError::PackageNotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path).map_err(|e| ValidationError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let archive = ZipArchive::new(file).map_err(|e| ValidationError::Archive {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        for raw in archive.file_names() {
            let name = normalize_entry_name(raw);
            if name.is_empty() {
                continue;
            }
            if raw.ends_with('/') {
                dirs.insert(name);
            } else {
                files.insert(name);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            files,
            dirs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw bytes of the `upgrade.json` descriptor.
    pub fn read_descriptor(&mut self) -> Result<Vec<u8>, ValidationError> {
        let mut entry = match self.archive.by_name(DESCRIPTOR_NAME) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(ValidationError::MissingDescriptor {
                    name: DESCRIPTOR_NAME,
                })
            }
            Err(e) => {
                return Err(ValidationError::Archive {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| ValidationError::Io {
                path: self.path.display().to_string(),
                source: e,
            })?;
        Ok(bytes)
    }

    /// Whether the archive holds a file entry with exactly this name.
    pub fn contains_file(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    /// Whether `name` is a file, an explicit directory entry, or a prefix of
    /// some file entry (directories are often stored without their own entry).
    pub fn contains_path(&self, name: &str) -> bool {
        if self.files.contains(name) || self.dirs.contains(name) {
            return true;
        }
        let prefix = format!("{name}/");
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|entry| entry.starts_with(&prefix))
    }

    /// Number of file entries.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Extract every entry under `dest`. Entries whose names would escape
    /// `dest` abort the extraction.
    pub fn extract_to(&mut self, dest: &Path) -> ApplyResult<usize> {
        let mut extracted = 0;
        for i in 0..self.archive.len() {
            let mut entry = self.archive.by_index(i).map_err(|e| ApplyError::Extract {
                message: format!("failed to read zip entry #{i}: {e}"),
            })?;

            // Written under the same name the validator indexed, so a
            // `sql\001.sql` entry lands at `sql/001.sql` on every platform.
            let name = normalize_entry_name(entry.name());
            if name.is_empty() {
                continue;
            }
            let relative = match (entry.enclosed_name(), normalize_archive_path(&name)) {
                (Some(_), Some(relative)) => relative,
                _ => {
                    return Err(ApplyError::Extract {
                        message: format!("entry '{}' escapes the package root", entry.name()),
                    })
                }
            };
            let outpath = relative.split('/').fold(dest.to_path_buf(), |p, c| p.join(c));

            if entry.is_dir() {
                fs::create_dir_all(&outpath).map_err(|e| extract_io_error(&outpath, e))?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).map_err(|e| extract_io_error(parent, e))?;
            }
            let mut outfile = File::create(&outpath).map_err(|e| extract_io_error(&outpath, e))?;
            io::copy(&mut entry, &mut outfile).map_err(|e| extract_io_error(&outpath, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode)).ok();
                }
            }
            extracted += 1;
        }
        log::debug!(
            "Extracted {extracted} file(s) from {} to {}",
            self.path.display(),
            dest.display()
        );
        Ok(extracted)
    }
}

fn extract_io_error(path: &Path, err: io::Error) -> ApplyError {
    ApplyError::Extract {
        message: format!("{}: {err}", path.display()),
    }
}

/// Entry names are compared the way manifests spell them: forward slashes,
/// no leading `./`, no trailing `/`.
fn normalize_entry_name(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let stripped = unified.strip_prefix("./").unwrap_or(&unified);
    stripped.trim_end_matches('/').to_string()
}
