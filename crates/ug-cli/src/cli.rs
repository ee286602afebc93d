//! CLI argument definitions using clap derive API

use clap::{Args, Parser};

/// apply_upgrade - validate and apply a POS upgrade package
#[derive(Parser, Debug)]
#[command(name = "apply_upgrade")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the upgrade package (.zip)
    pub package: String,

    /// Validate and print the manifest version and steps, then exit.
    /// Ignored when `--dry-run` is also given.
    #[arg(long)]
    pub preview: bool,

    /// Validate and run the engine in dry-run mode (no changes)
    #[arg(long)]
    pub dry_run: bool,

    /// Override the target database path (falls back to UPGRADE_DB_PATH)
    #[arg(long)]
    pub db_path: Option<String>,

    /// Install directory that copy steps write into
    #[arg(long)]
    pub install_dir: Option<String>,

    /// Skip the database backup (a failed upgrade cannot be rolled back)
    #[arg(long)]
    pub no_backup: bool,

    /// Running application version, checked against min_app_version
    #[arg(long)]
    pub app_version: Option<String>,

    /// Expected SHA-256 of the package file
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Timeout for script and command steps, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the execution summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every mode
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file path (default: upgrade.yml in the install directory)
    #[arg(short, long)]
    pub config: Option<String>,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
