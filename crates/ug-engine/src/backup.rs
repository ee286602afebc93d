//! Database snapshots and copy-step file backups.
//!
//! The database is protected by a whole-file copy taken before any step
//! runs. Restoring copies it back byte for byte; the connection must already
//! be closed and no other process may hold the file open.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Pre-execution copy of the target database file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbSnapshot {
    /// The database existed and was copied to `backup_path`
    Copied {
        db_path: PathBuf,
        backup_path: PathBuf,
    },
    /// The database did not exist yet; restoring removes whatever the apply
    /// created
    Absent { db_path: PathBuf },
}

impl DbSnapshot {
    /// Copy `db_path` into `backup_dir` as `<file name>.bak`.
    pub fn take(db_path: &Path, backup_dir: &Path) -> io::Result<Self> {
        if !db_path.exists() {
            return Ok(DbSnapshot::Absent {
                db_path: db_path.to_path_buf(),
            });
        }

        let file_name = db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let backup_path = backup_dir.join(format!("{file_name}.bak"));
        fs::create_dir_all(backup_dir)?;
        fs::copy(db_path, &backup_path)?;

        Ok(DbSnapshot::Copied {
            db_path: db_path.to_path_buf(),
            backup_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        match self {
            DbSnapshot::Copied { db_path, .. } | DbSnapshot::Absent { db_path } => db_path,
        }
    }

    pub fn backup_path(&self) -> Option<&Path> {
        match self {
            DbSnapshot::Copied { backup_path, .. } => Some(backup_path),
            DbSnapshot::Absent { .. } => None,
        }
    }

    /// Put the database back exactly as it was when the snapshot was taken.
    pub fn restore(&self) -> io::Result<()> {
        match self {
            DbSnapshot::Copied {
                db_path,
                backup_path,
            } => {
                fs::copy(backup_path, db_path)?;
                Ok(())
            }
            DbSnapshot::Absent { db_path } => match fs::remove_file(db_path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            },
        }
    }
}

/// One destination write performed by a copy step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileBackup {
    /// `dest` existed; its previous contents were saved to `backup`
    Replaced { dest: PathBuf, backup: PathBuf },
    /// `dest` did not exist before the copy
    Created { dest: PathBuf },
}

/// Outcome of replaying a [`FileBackupJournal`].
#[derive(Debug, Default)]
pub struct FileRestoreReport {
    pub restored: usize,
    pub removed: usize,
    pub failures: Vec<String>,
}

/// Ordered record of every file a copy step wrote, with backups of the
/// files it overwrote.
#[derive(Debug)]
pub struct FileBackupJournal {
    dir: PathBuf,
    entries: Vec<FileBackup>,
}

impl FileBackupJournal {
    /// Backups are written under `dir`, created on first use.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[FileBackup] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy `src` to `dest`, first saving any existing `dest`.
    pub fn copy_with_backup(&mut self, src: &Path, dest: &Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let entry = if dest.is_file() {
            fs::create_dir_all(&self.dir)?;
            let name = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string());
            let backup = self
                .dir
                .join(format!("{:04}_{name}", self.entries.len() + 1));
            fs::copy(dest, &backup)?;
            FileBackup::Replaced {
                dest: dest.to_path_buf(),
                backup,
            }
        } else {
            FileBackup::Created {
                dest: dest.to_path_buf(),
            }
        };

        // Recorded before the write so a copy that fails halfway is still undone.
        self.entries.push(entry);
        fs::copy(src, dest)?;
        Ok(())
    }

    /// Undo recorded writes, newest first. Directories created along the way
    /// are left in place.
    pub fn restore(&self) -> FileRestoreReport {
        let mut report = FileRestoreReport::default();
        for entry in self.entries.iter().rev() {
            match entry {
                FileBackup::Replaced { dest, backup } => match fs::copy(backup, dest) {
                    Ok(_) => report.restored += 1,
                    Err(e) => report
                        .failures
                        .push(format!("failed to restore {}: {e}", dest.display())),
                },
                FileBackup::Created { dest } => match fs::remove_file(dest) {
                    Ok(()) => report.removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => report.removed += 1,
                    Err(e) => report
                        .failures
                        .push(format!("failed to remove {}: {e}", dest.display())),
                },
            }
        }
        report
    }
}

#[cfg(test)]
#[path = "backup_test.rs"]
mod tests;
