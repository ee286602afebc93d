//! Step executor: performs one validated step against an install.

use crate::backup::FileBackupJournal;
use crate::error::{ApplyError, ApplyResult};
use crate::process::{run_with_timeout, ProcessError, ProcessOutput};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use ug_core::{compute_checksum, Step};
use ug_db::Database;
use walkdir::WalkDir;

/// Everything a step needs besides the database handle.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Root of the extracted package; working directory for subprocesses
    pub package_dir: PathBuf,
    /// Directory copy steps write into
    pub install_dir: PathBuf,
    /// Target database file, exported to subprocesses
    pub db_path: PathBuf,
    /// Version of the package being applied
    pub version: String,
    /// Timeout for script/command steps without their own override
    pub default_timeout: Duration,
    /// Interpreter for `.py` scripts
    pub python: String,
}

impl ExecutionContext {
    fn timeout_for(&self, step: &Step) -> Duration {
        step.timeout_secs()
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    /// Environment handed to every child process.
    ///
    /// - `UPGRADE_DB_PATH`: target database file
    /// - `UPGRADE_INSTALL_DIR`: install directory
    /// - `UPGRADE_PACKAGE_DIR`: extracted package root
    /// - `UPGRADE_VERSION`: package version
    /// - `PYTHONPATH`: extracted package root, so Python steps can import
    ///   helper modules bundled next to them
    fn child_env(&self) -> Vec<(&'static str, OsString)> {
        vec![
            ("UPGRADE_DB_PATH", self.db_path.clone().into_os_string()),
            (
                "UPGRADE_INSTALL_DIR",
                self.install_dir.clone().into_os_string(),
            ),
            (
                "UPGRADE_PACKAGE_DIR",
                self.package_dir.clone().into_os_string(),
            ),
            ("UPGRADE_VERSION", OsString::from(&self.version)),
            ("PYTHONPATH", self.package_dir.clone().into_os_string()),
        ]
    }
}

/// Execute one step and return its log lines.
pub fn execute_step(
    step: &Step,
    ctx: &ExecutionContext,
    db: &dyn Database,
    files: &mut FileBackupJournal,
) -> ApplyResult<Vec<String>> {
    match step {
        Step::Sql { file } => execute_sql(file, ctx, db),
        Step::Script { file, .. } => execute_script(file, ctx.timeout_for(step), ctx),
        Step::Copy { src, dest } => {
            execute_copy(src, dest.as_deref().unwrap_or(src), ctx, files)
        }
        Step::Command { cmd, .. } => execute_command(cmd, ctx.timeout_for(step), ctx),
    }
}

fn execute_sql(
    file: &str,
    ctx: &ExecutionContext,
    db: &dyn Database,
) -> ApplyResult<Vec<String>> {
    let path = ctx.package_dir.join(file);
    let sql = fs::read_to_string(&path).map_err(|e| ApplyError::ReadFile {
        path: file.to_string(),
        source: e,
    })?;
    log::debug!("Executing {file} (sha256 {})", compute_checksum(&sql));

    db.execute_script(&sql).map_err(|e| ApplyError::Sql {
        file: file.to_string(),
        source: e,
    })?;

    let mut logs = vec![format!("Applied SQL: {file}")];
    // Diagnostic only; a failure here does not fail the step.
    match db.list_tables() {
        Ok(tables) => logs.push(format!("Tables now present: {}", tables.join(", "))),
        Err(e) => log::warn!("Could not list tables after {file}: {e}"),
    }
    Ok(logs)
}

fn execute_script(
    file: &str,
    timeout: Duration,
    ctx: &ExecutionContext,
) -> ApplyResult<Vec<String>> {
    let script = ctx.package_dir.join(file);
    let mut command = script_command(&script, &ctx.python);
    command.current_dir(&ctx.package_dir).envs(ctx.child_env());

    let what = format!("script '{file}'");
    let output = run_step_process(command, timeout, &what)?;

    let mut logs = vec![format!("Ran script {file} (exit {})", output.exit_label())];
    if !output.stdout.trim().is_empty() {
        logs.push(format!("Script stdout: {}", output.stdout.trim_end()));
    }
    if !output.stderr.trim().is_empty() {
        logs.push(format!("Script stderr: {}", output.stderr.trim_end()));
    }

    if !output.status.success() {
        return Err(ApplyError::ScriptFailed {
            file: file.to_string(),
            exit: output.exit_label(),
            stderr: output.stderr.trim_end().to_string(),
        });
    }
    Ok(logs)
}

fn execute_command(
    cmd: &str,
    timeout: Duration,
    ctx: &ExecutionContext,
) -> ApplyResult<Vec<String>> {
    let mut command = shell_command(cmd);
    command.current_dir(&ctx.package_dir).envs(ctx.child_env());

    let what = format!("command '{cmd}'");
    let output = run_step_process(command, timeout, &what)?;

    let line = format!(
        "Command exit {}; out={}; err={}",
        output.exit_label(),
        output.stdout.trim_end(),
        output.stderr.trim_end()
    );
    if !output.status.success() {
        log::debug!("{line}");
        return Err(ApplyError::CommandFailed {
            cmd: cmd.to_string(),
            exit: output.exit_label(),
            stderr: output.stderr.trim_end().to_string(),
        });
    }
    Ok(vec![line])
}

fn execute_copy(
    src: &str,
    dest: &str,
    ctx: &ExecutionContext,
    files: &mut FileBackupJournal,
) -> ApplyResult<Vec<String>> {
    let src_path = ctx.package_dir.join(src);
    let dest_path = ctx.install_dir.join(dest);

    if !src_path.is_dir() {
        copy_file(&src_path, &dest_path, files)?;
        return Ok(vec![format!(
            "Copied file {src} -> {}",
            dest_path.display()
        )]);
    }

    let mut copied = 0usize;
    for entry in WalkDir::new(&src_path).sort_by_file_name() {
        let entry = entry.map_err(|e| ApplyError::Copy {
            src: src_path.display().to_string(),
            dest: dest_path.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&src_path) else {
            continue;
        };
        copy_file(entry.path(), &dest_path.join(relative), files)?;
        copied += 1;
    }
    Ok(vec![format!(
        "Copied directory {src} -> {} ({copied} file(s))",
        dest_path.display()
    )])
}

fn copy_file(src: &Path, dest: &Path, files: &mut FileBackupJournal) -> ApplyResult<()> {
    files
        .copy_with_backup(src, dest)
        .map_err(|e| ApplyError::Copy {
            src: src.display().to_string(),
            dest: dest.display().to_string(),
            source: e,
        })
}

fn run_step_process(
    command: Command,
    timeout: Duration,
    what: &str,
) -> ApplyResult<ProcessOutput> {
    log::debug!("Running {what} with timeout {}s", timeout.as_secs());
    run_with_timeout(command, timeout).map_err(|e| match e {
        ProcessError::TimedOut => ApplyError::Timeout {
            what: what.to_string(),
            secs: timeout.as_secs(),
        },
        ProcessError::Spawn(source) | ProcessError::Wait(source) => ApplyError::Spawn {
            what: what.to_string(),
            source,
        },
    })
}

/// Pick how to run a bundled script from its extension.
fn script_command(script: &Path, python: &str) -> Command {
    match script.extension().and_then(|ext| ext.to_str()) {
        Some("py") => {
            let mut command = Command::new(python);
            command.arg(script);
            command
        }
        Some("sh") => {
            let mut command = Command::new("sh");
            command.arg(script);
            command
        }
        _ => Command::new(script),
    }
}

fn shell_command(cmd: &str) -> Command {
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(cmd);
        command
    }
    #[cfg(not(windows))]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        command
    }
}

#[cfg(all(test, unix))]
#[path = "executor_test.rs"]
mod tests;
