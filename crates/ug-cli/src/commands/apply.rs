//! Preview, dry-run and apply an upgrade package

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use ug_core::UpgradeConfig;
use ug_engine::{
    apply_package, validate_package, ApplyOptions, CancellationToken, ExecutionSummary, Progress,
};

use crate::cli::Cli;
use crate::commands::common::{
    ExitCode, EXIT_APPLY_FAILED, EXIT_PACKAGE_NOT_FOUND, EXIT_UNHANDLED,
};

/// Execute the apply_upgrade command
pub(crate) async fn execute(cli: &Cli) -> Result<()> {
    let package = PathBuf::from(&cli.package);
    if !package.is_file() {
        eprintln!("Package not found: {}", package.display());
        return Err(ExitCode(EXIT_PACKAGE_NOT_FOUND).into());
    }

    let config = build_config(cli)?;
    if cli.global.verbose {
        eprintln!("[verbose] Package: {}", package.display());
        eprintln!("[verbose] Config: {config:?}");
    }

    // `--dry-run` already prints the preview, so it wins when both are given.
    if cli.dry_run {
        return dry_run(&package, &config, cli);
    }
    if cli.preview {
        return preview(&package, &config);
    }
    apply(&package, &config, cli).await
}

/// Layer CLI flags and `UPGRADE_DB_PATH` over the config file.
pub(crate) fn build_config(cli: &Cli) -> Result<UpgradeConfig> {
    let mut config = match &cli.global.config {
        Some(path) => UpgradeConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load config '{path}'"))?,
        None => {
            let dir = match &cli.install_dir {
                Some(dir) => PathBuf::from(dir),
                None => std::env::current_dir().context("Failed to read current directory")?,
            };
            UpgradeConfig::load_from_dir(&dir).context("Failed to load upgrade.yml")?
        }
    };

    if let Some(dir) = &cli.install_dir {
        config.install_dir = Some(PathBuf::from(dir));
    }
    if let Some(db_path) = UpgradeConfig::resolve_db_override(cli.db_path.as_deref()) {
        let db_path = PathBuf::from(db_path);
        config.db_path = Some(if db_path.is_absolute() {
            db_path
        } else {
            std::env::current_dir()
                .context("Failed to read current directory")?
                .join(db_path)
        });
    }
    if cli.no_backup {
        config.backup_db = false;
    }
    if let Some(version) = &cli.app_version {
        config.app_version = Some(version.clone());
    }
    if let Some(secs) = cli.timeout {
        config.step_timeout_secs = secs;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn preview(package: &Path, config: &UpgradeConfig) -> Result<()> {
    match validate_package(package, config.app_version.as_deref()) {
        Ok(manifest) => {
            println!("Manifest version: {}", manifest.version);
            if let Some(description) = &manifest.description {
                println!("Description: {description}");
            }
            for (i, step) in manifest.steps.iter().enumerate() {
                println!("{}. {step}", i + 1);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Err(ExitCode(EXIT_UNHANDLED).into())
        }
    }
}

fn dry_run(package: &Path, config: &UpgradeConfig, cli: &Cli) -> Result<()> {
    if !cli.json {
        preview(package, config)?;
    }

    let options = ApplyOptions {
        dry_run: true,
        expected_sha256: cli.sha256.clone(),
        ..ApplyOptions::default()
    };
    let summary = match apply_package(package, config, options) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {e}");
            return Err(ExitCode(EXIT_UNHANDLED).into());
        }
    };

    if cli.json {
        print_json(&summary)?;
    } else if cli.global.verbose {
        print_logs(&summary);
    }
    Ok(())
}

async fn apply(package: &Path, config: &UpgradeConfig, cli: &Cli) -> Result<()> {
    let token = CancellationToken::new();
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling after the current step...");
                token.cancel();
            }
        })
    };

    let progress_bar = if !cli.global.verbose && !cli.json {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };
    let on_progress = |p: &Progress| {
        if let Some(pb) = &progress_bar {
            pb.set_position((p.fraction * 100.0).round() as u64);
            pb.set_message(p.message.clone());
        }
    };

    let options = ApplyOptions {
        dry_run: false,
        expected_sha256: cli.sha256.clone(),
        progress: Some(&on_progress),
        cancel: Some(token),
    };
    // Steps block on child processes and SQLite; keep the runtime's other
    // workers free for the Ctrl-C watcher.
    let result = tokio::task::block_in_place(|| apply_package(package, config, options));
    watcher.abort();
    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Validation failed: {e}");
            println!("Upgrade failed");
            return Err(ExitCode(EXIT_APPLY_FAILED).into());
        }
    };

    if cli.json {
        print_json(&summary)?;
    } else {
        print_logs(&summary);
        if let Some(dir) = &summary.backup_dir {
            println!("Backup kept at {}", dir.display());
        }
        if summary.cancelled {
            println!("Upgrade cancelled");
        }
        if summary.success {
            println!("Upgrade applied successfully");
        } else {
            println!("Upgrade failed");
        }
    }

    if cli.global.verbose {
        eprintln!(
            "[verbose] Finished in {:.2}s (restored: {})",
            summary.duration_secs, summary.restored
        );
    }

    if summary.success {
        Ok(())
    } else {
        Err(ExitCode(EXIT_APPLY_FAILED).into())
    }
}

fn print_logs(summary: &ExecutionSummary) {
    for line in &summary.logs {
        println!("{line}");
    }
}

fn print_json(summary: &ExecutionSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
#[path = "apply_test.rs"]
mod tests;
