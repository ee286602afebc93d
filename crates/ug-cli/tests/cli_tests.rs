//! End-to-end tests for the apply_upgrade binary

use rusqlite::Connection;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn apply_upgrade_bin() -> String {
    env!("CARGO_BIN_EXE_apply_upgrade").to_string()
}

struct Site {
    dir: TempDir,
}

impl Site {
    /// An install directory whose upgrade.yml keeps scratch files inside the
    /// test's temp dir.
    fn new() -> Self {
        let site = Self {
            dir: tempdir().unwrap(),
        };
        fs::create_dir_all(site.install()).unwrap();
        fs::write(
            site.install().join("upgrade.yml"),
            format!("backup_root: {}\n", site.dir.path().join("scratch").display()),
        )
        .unwrap();
        site
    }

    fn install(&self) -> PathBuf {
        self.dir.path().join("install")
    }

    fn db_path(&self) -> PathBuf {
        self.install().join("pos.db")
    }

    fn package(&self, manifest: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = self.dir.path().join("package.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("upgrade.json", options).unwrap();
        zip.write_all(manifest.as_bytes()).unwrap();
        for (name, contents) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn run(&self, package: &Path, extra: &[&str]) -> Output {
        Command::new(apply_upgrade_bin())
            .arg(package)
            .arg("--install-dir")
            .arg(self.install())
            .arg("--db-path")
            .arg(self.db_path())
            .args(extra)
            .env_remove("UPGRADE_DB_PATH")
            .output()
            .unwrap()
    }

    fn has_table(&self, name: &str) -> bool {
        let conn = Connection::open(self.db_path()).unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }
}

const P1: &str = r#"{"version": "1.1.0", "description": "Add t",
    "steps": [{"type": "sql", "file": "sql/001.sql"}]}"#;
const CREATE_T: &str = "CREATE TABLE t(id INTEGER PRIMARY KEY);";

#[test]
fn test_missing_package_exits_2() {
    let site = Site::new();
    let output = site.run(&site.dir.path().join("missing.zip"), &[]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Package not found"), "{stderr}");
}

#[test]
fn test_preview_prints_version_and_steps() {
    let site = Site::new();
    let package = site.package(P1, &[("sql/001.sql", CREATE_T)]);

    let output = site.run(&package, &["--preview"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Manifest version: 1.1.0"), "{stdout}");
    assert!(stdout.contains("Description: Add t"), "{stdout}");
    assert!(stdout.contains("1. sql: sql/001.sql"), "{stdout}");
    assert!(!site.db_path().exists());
}

#[test]
fn test_preview_of_invalid_package_exits_4() {
    let site = Site::new();
    let package = site.package(r#"{"steps": []}"#, &[]);

    let output = site.run(&package, &["--preview"]);

    assert_eq!(output.status.code(), Some(4));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("version"), "{stderr}");
}

#[test]
fn test_preview_with_dry_run_runs_dry_run() {
    let site = Site::new();
    let package = site.package(P1, &[("sql/001.sql", CREATE_T)]);

    let output = site.run(&package, &["--preview", "--dry-run"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Manifest version: 1.1.0"), "{stdout}");
    assert!(stdout.contains("1. sql: sql/001.sql"), "{stdout}");
    assert!(!site.db_path().exists());
}

#[test]
fn test_dry_run_changes_nothing() {
    let site = Site::new();
    let package = site.package(P1, &[("sql/001.sql", CREATE_T)]);

    let output = site.run(&package, &["--dry-run", "--verbose"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DRY RUN"), "{stdout}");
    assert!(!site.db_path().exists());
}

#[test]
fn test_apply_success_exits_0() {
    let site = Site::new();
    let package = site.package(P1, &[("sql/001.sql", CREATE_T)]);

    let output = site.run(&package, &[]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Applied SQL: sql/001.sql"), "{stdout}");
    assert!(stdout.trim_end().ends_with("Upgrade applied successfully"), "{stdout}");
    assert!(site.has_table("t"));
}

#[test]
fn test_apply_failure_exits_3_and_restores() {
    let site = Site::new();
    Connection::open(site.db_path())
        .unwrap()
        .execute_batch("CREATE TABLE customers(id INTEGER);")
        .unwrap();
    let before = fs::read(site.db_path()).unwrap();
    let package = site.package(
        r#"{"version": "1.2.0", "steps": [
            {"type": "sql", "file": "sql/001.sql"},
            {"type": "script", "file": "fail.sh"}
        ]}"#,
        &[("sql/001.sql", CREATE_T), ("fail.sh", "exit 2\n")],
    );

    let output = site.run(&package, &[]);

    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Restored database from"), "{stdout}");
    assert!(stdout.trim_end().ends_with("Upgrade failed"), "{stdout}");
    assert_eq!(fs::read(site.db_path()).unwrap(), before);
    assert!(!site.has_table("t"));
}

#[test]
fn test_validation_error_during_apply_exits_3() {
    let site = Site::new();
    let package = site.package(
        r#"{"version": "1.0.0", "steps": [{"type": "sql", "file": "nope.sql"}]}"#,
        &[],
    );

    let output = site.run(&package, &[]);

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.sql"), "{stderr}");
}

#[test]
fn test_json_summary() {
    let site = Site::new();
    let package = site.package(P1, &[("sql/001.sql", CREATE_T)]);

    let output = site.run(&package, &["--json"]);

    assert_eq!(output.status.code(), Some(0));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["success"], true);
    assert_eq!(summary["restored"], false);
    assert_eq!(summary["manifest"]["version"], "1.1.0");
}
