//! Apply orchestrator.
//!
//! Drives one package through validation, extraction, backup, step
//! execution and commit. Anything that goes wrong after validation is
//! folded into the returned [`ExecutionSummary`] together with a
//! best-effort restore; only validation errors are returned as `Err`.

use crate::backup::{DbSnapshot, FileBackupJournal};
use crate::error::{ApplyError, ValidationError};
use crate::executor::{execute_step, ExecutionContext};
use crate::package::PackageArchive;
use crate::validate::{validate_package, verify_package_checksum};
use chrono::{SecondsFormat, Utc};
use log::Level;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use ug_core::{Manifest, ManifestSummary, UpgradeConfig};
use ug_db::{Database, SqliteBackend};

/// Progress notification passed to [`ApplyOptions::progress`].
#[derive(Debug, Clone)]
pub struct Progress {
    pub message: String,
    /// Completed share of the run, in `[0, 1]`
    pub fraction: f64,
}

/// Cooperative cancellation flag shared between a caller and a running apply.
///
/// The orchestrator checks it before extraction, before backup, and before
/// every step; a step that is already running is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call options for [`apply_package`].
#[derive(Default)]
pub struct ApplyOptions<'a> {
    /// Validate only; never touch the database or install directory
    pub dry_run: bool,
    /// Expected SHA-256 of the package file, checked before validation
    pub expected_sha256: Option<String>,
    pub progress: Option<&'a dyn Fn(&Progress)>,
    pub cancel: Option<CancellationToken>,
}

impl ApplyOptions<'_> {
    fn report(&self, message: &str, fraction: f64) {
        if let Some(progress) = self.progress {
            progress(&Progress {
                message: message.to_string(),
                fraction: fraction.clamp(0.0, 1.0),
            });
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Result of one apply or dry-run call.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub success: bool,
    /// Whether the pre-apply state was put back after a failure
    pub restored: bool,
    pub cancelled: bool,
    pub manifest: Option<ManifestSummary>,
    /// Timestamped log lines in the order they were produced
    pub logs: Vec<String>,
    /// Messages of every error-level log line
    pub errors: Vec<String>,
    /// Backup directory kept after a failed or cancelled apply
    pub backup_dir: Option<PathBuf>,
    pub duration_secs: f64,
}

/// Ordered run log mirrored to the `log` facade.
#[derive(Debug, Default)]
struct RunLog {
    lines: Vec<String>,
    errors: Vec<String>,
}

impl RunLog {
    fn push(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(level, "{message}");
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.lines.push(format!("[{timestamp}] {level}: {message}"));
        if level == Level::Error {
            self.errors.push(message);
        }
    }

    fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message);
    }

    fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }
}

/// Why a run stopped before completing.
#[derive(Debug)]
enum Halt {
    Failed(ApplyError),
    Cancelled,
}

impl From<ApplyError> for Halt {
    fn from(err: ApplyError) -> Self {
        Halt::Failed(err)
    }
}

#[derive(Debug, Default)]
struct Outcome {
    success: bool,
    restored: bool,
    cancelled: bool,
    backup_dir: Option<PathBuf>,
}

impl Outcome {
    fn halted(halt: &Halt) -> Self {
        Self {
            cancelled: matches!(halt, Halt::Cancelled),
            ..Self::default()
        }
    }
}

/// Validate and apply an upgrade package.
pub fn apply_package(
    package: &Path,
    config: &UpgradeConfig,
    options: ApplyOptions<'_>,
) -> Result<ExecutionSummary, ValidationError> {
    let started = Instant::now();
    let mut run = RunLog::default();
    run.info("Starting upgrade process");
    options.report("Validating package", 0.0);

    if let Some(expected) = options.expected_sha256.as_deref() {
        verify_package_checksum(package, expected)?;
        run.info("Package checksum verified");
    }
    let manifest = validate_package(package, config.app_version.as_deref())?;
    run.info(format!("Package validated: {}", manifest.version));

    let outcome = if options.dry_run {
        run.info("DRY RUN: validation passed, skipping application");
        Outcome {
            success: true,
            ..Outcome::default()
        }
    } else {
        apply_validated(package, &manifest, config, &options, &mut run)
    };

    if outcome.success {
        run.info("Upgrade completed successfully");
    } else if outcome.cancelled {
        run.warn("Upgrade cancelled");
    } else {
        run.error("Upgrade failed");
    }
    options.report("Done", 1.0);

    Ok(ExecutionSummary {
        success: outcome.success,
        restored: outcome.restored,
        cancelled: outcome.cancelled,
        manifest: Some(manifest.summary()),
        logs: run.lines,
        errors: run.errors,
        backup_dir: outcome.backup_dir,
        duration_secs: started.elapsed().as_secs_f64(),
    })
}

fn apply_validated(
    package: &Path,
    manifest: &Manifest,
    config: &UpgradeConfig,
    options: &ApplyOptions<'_>,
    run: &mut RunLog,
) -> Outcome {
    let (extract_dir, ctx) = match prepare(package, manifest, config, options, run) {
        Ok(prepared) => prepared,
        Err(halt) => {
            log_halt(&halt, run);
            return Outcome::halted(&halt);
        }
    };

    let outcome = run_with_backup(manifest, config, options, &ctx, run);

    let extract_path = extract_dir.path().to_path_buf();
    match extract_dir.close() {
        Ok(()) => run.info("Temporary files cleaned up"),
        Err(e) => run.warn(format!(
            "Failed to remove {}: {e}",
            extract_path.display()
        )),
    }
    outcome
}

/// Resolve paths and extract the package into a scratch directory.
fn prepare(
    package: &Path,
    manifest: &Manifest,
    config: &UpgradeConfig,
    options: &ApplyOptions<'_>,
    run: &mut RunLog,
) -> Result<(TempDir, ExecutionContext), Halt> {
    let install_dir = config
        .resolve_install_dir()
        .map_err(|e| ApplyError::Workspace {
            path: "install directory".to_string(),
            source: e,
        })?;
    let db_path = config.resolve_db_path(&install_dir);
    let scratch_root = scratch_root(config);
    fs::create_dir_all(&scratch_root).map_err(|e| ApplyError::Workspace {
        path: scratch_root.display().to_string(),
        source: e,
    })?;

    if options.is_cancelled() {
        return Err(Halt::Cancelled);
    }
    options.report("Extracting package", 0.05);

    let extract_dir = tempfile::Builder::new()
        .prefix("upgrade_")
        .tempdir_in(&scratch_root)
        .map_err(|e| ApplyError::Workspace {
            path: scratch_root.display().to_string(),
            source: e,
        })?;
    let mut archive = PackageArchive::open(package).map_err(|e| ApplyError::Extract {
        message: e.to_string(),
    })?;
    let count = archive.extract_to(extract_dir.path())?;
    run.info(format!(
        "Package extracted to {} ({count} file(s))",
        extract_dir.path().display()
    ));

    let ctx = ExecutionContext {
        package_dir: extract_dir.path().to_path_buf(),
        install_dir,
        db_path,
        version: manifest.version.clone(),
        default_timeout: config.step_timeout(),
        python: config.python.clone(),
    };
    Ok((extract_dir, ctx))
}

fn scratch_root(config: &UpgradeConfig) -> PathBuf {
    config
        .backup_root
        .clone()
        .unwrap_or_else(std::env::temp_dir)
}

/// Take backups, run every step, and restore on failure.
fn run_with_backup(
    manifest: &Manifest,
    config: &UpgradeConfig,
    options: &ApplyOptions<'_>,
    ctx: &ExecutionContext,
    run: &mut RunLog,
) -> Outcome {
    if options.is_cancelled() {
        log_halt(&Halt::Cancelled, run);
        return Outcome::halted(&Halt::Cancelled);
    }
    options.report("Backing up database", 0.1);

    let backup_dir = match tempfile::Builder::new()
        .prefix("upgrade_backup_")
        .tempdir_in(scratch_root(config))
    {
        Ok(dir) => dir,
        Err(e) => {
            let halt = Halt::Failed(ApplyError::Workspace {
                path: scratch_root(config).display().to_string(),
                source: e,
            });
            log_halt(&halt, run);
            return Outcome::halted(&halt);
        }
    };

    let snapshot = if config.backup_db {
        match take_snapshot(ctx, backup_dir.path(), run) {
            Ok(snapshot) => Some(snapshot),
            Err(halt) => {
                log_halt(&halt, run);
                return Outcome::halted(&halt);
            }
        }
    } else {
        run.warn("Database backup disabled; a failed upgrade cannot be rolled back");
        None
    };

    let mut files = FileBackupJournal::new(backup_dir.path().join("files"));
    let result = execute_all(manifest, options, ctx, &mut files, run);

    match result {
        Ok(()) => {
            let path = backup_dir.path().to_path_buf();
            if let Err(e) = backup_dir.close() {
                run.warn(format!("Failed to remove backup {}: {e}", path.display()));
            }
            Outcome {
                success: true,
                ..Outcome::default()
            }
        }
        Err(halt) => {
            log_halt(&halt, run);
            run.warn("Attempting rollback due to failure");
            let restored = roll_back(snapshot.as_ref(), &files, config, run);
            let kept = backup_dir.keep();
            run.info(format!("Backup directory preserved at {}", kept.display()));
            Outcome {
                restored,
                backup_dir: Some(kept),
                ..Outcome::halted(&halt)
            }
        }
    }
}

fn take_snapshot(
    ctx: &ExecutionContext,
    backup_dir: &Path,
    run: &mut RunLog,
) -> Result<DbSnapshot, Halt> {
    let snapshot = DbSnapshot::take(&ctx.db_path, backup_dir).map_err(|e| ApplyError::Backup {
        path: ctx.db_path.display().to_string(),
        source: e,
    })?;
    match &snapshot {
        DbSnapshot::Copied { backup_path, .. } => {
            run.info(format!("Database backed up to {}", backup_path.display()));
        }
        DbSnapshot::Absent { db_path } => run.info(format!(
            "No database at {}; it will be created",
            db_path.display()
        )),
    }
    Ok(snapshot)
}

/// Open the database and run the steps in manifest order.
///
/// The connection is closed before this returns on every path, so a
/// restore never races an open handle.
fn execute_all(
    manifest: &Manifest,
    options: &ApplyOptions<'_>,
    ctx: &ExecutionContext,
    files: &mut FileBackupJournal,
    run: &mut RunLog,
) -> Result<(), Halt> {
    if let Some(parent) = ctx.db_path.parent() {
        fs::create_dir_all(parent).map_err(|e| ApplyError::Workspace {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    let db = SqliteBackend::open(&ctx.db_path).map_err(ApplyError::Database)?;
    log::debug!("Using {} database {}", db.db_type(), ctx.db_path.display());

    let result = run_steps(manifest, options, ctx, &db, files, run).and_then(|()| {
        options.report("Committing", 0.95);
        db.finish().map_err(|e| Halt::Failed(ApplyError::Commit(e)))?;
        run.info("All database changes committed");
        Ok(())
    });

    if result.is_err() {
        if let Err(e) = db.abort() {
            run.warn(format!("Rollback of open transaction failed: {e}"));
        }
    }
    if let Err(e) = db.close() {
        run.warn(format!("Failed to close database: {e}"));
    }
    result
}

fn run_steps(
    manifest: &Manifest,
    options: &ApplyOptions<'_>,
    ctx: &ExecutionContext,
    db: &dyn Database,
    files: &mut FileBackupJournal,
    run: &mut RunLog,
) -> Result<(), Halt> {
    let total = manifest.steps.len();
    for (i, step) in manifest.steps.iter().enumerate() {
        let number = i + 1;
        if options.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        options.report(
            &format!("Executing step {number}/{total}: {}", step.kind()),
            0.1 + 0.85 * i as f64 / total as f64,
        );

        run.info(format!("Starting step #{number}: type={}", step.kind()));
        match execute_step(step, ctx, db, files) {
            Ok(lines) => {
                for line in lines {
                    run.info(line);
                }
                run.info(format!("Completed step #{number}"));
            }
            Err(e) => {
                run.error(format!("Step #{number} failed: {e}"));
                return Err(Halt::Failed(e));
            }
        }
    }
    Ok(())
}

/// Put back copied-over files and the database. Returns whether everything
/// was restored.
fn roll_back(
    snapshot: Option<&DbSnapshot>,
    files: &FileBackupJournal,
    config: &UpgradeConfig,
    run: &mut RunLog,
) -> bool {
    let mut files_ok = true;
    if !files.is_empty() {
        if config.restore_files {
            let report = files.restore();
            run.info(format!(
                "Restored {} file(s), removed {} file(s)",
                report.restored, report.removed
            ));
            for failure in &report.failures {
                run.error(failure.clone());
            }
            files_ok = report.failures.is_empty();
        } else {
            run.warn(format!(
                "File restore disabled; {} copied file(s) left in place",
                files.len()
            ));
        }
    }

    let Some(snapshot) = snapshot else {
        run.warn("No database backup available; database not restored");
        return false;
    };
    match snapshot.restore() {
        Ok(()) => {
            match snapshot.backup_path() {
                Some(backup) => run.info(format!("Restored database from {}", backup.display())),
                None => run.info(format!(
                    "Removed database created during upgrade at {}",
                    snapshot.db_path().display()
                )),
            }
            files_ok
        }
        Err(e) => {
            run.error(format!("Failed to restore database: {e}"));
            false
        }
    }
}

fn log_halt(halt: &Halt, run: &mut RunLog) {
    match halt {
        Halt::Cancelled => run.warn("Cancellation requested; stopping"),
        // Step failures are already logged with their step number.
        Halt::Failed(
            ApplyError::Sql { .. }
            | ApplyError::ScriptFailed { .. }
            | ApplyError::CommandFailed { .. }
            | ApplyError::Timeout { .. }
            | ApplyError::Spawn { .. }
            | ApplyError::Copy { .. }
            | ApplyError::ReadFile { .. },
        ) => {}
        Halt::Failed(e) => run.error(e.to_string()),
    }
}
