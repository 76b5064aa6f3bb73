//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Every flag is optional; unset flags leave the XML/default value alone.
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, ValueHint};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, FileFilter, LogLevel};
use crate::errors::MoverError;

/// Watch a staging directory and move finished files to an archive directory.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Move finished acquisition files to an archive safely")]
pub struct Args {
    /// Config file to use instead of $FILE_MOVER_CONFIG or the OS default location.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Override the staging (local) directory.
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub local_dir: Option<PathBuf>,

    /// Override the archive (remote) directory.
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub remote_dir: Option<PathBuf>,

    /// Filename filter: a suffix like `.rhd`, or `regex:<pattern>`.
    #[arg(long, value_name = "FILTER")]
    pub filter: Option<String>,

    /// Seconds a file's size must stay constant before it is moved.
    #[arg(long, value_name = "SECS")]
    pub stability_wait: Option<u64>,

    /// Seconds between directory scans.
    #[arg(long, value_name = "SECS")]
    pub scan_interval: Option<u64>,

    /// Maximum concurrent transfers.
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Compare SHA-256 of source and copy before finalizing.
    #[arg(long)]
    pub verify_checksum: bool,

    /// Dry-run: report what would be moved but do not touch any file.
    #[arg(long, help = "Show what would be moved, but do not modify files")]
    pub dry_run: bool,

    /// Run a single scan cycle, wait for its transfers, then exit.
    #[arg(long)]
    pub once: bool,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, help = "Enable debug logging (shorthand for --log-level debug)")]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, help = "Emit logs in structured JSON")]
    pub json: bool,

    /// Print which config file would be used, then exit.
    #[arg(long, help = "Print the config file location used by file_mover and exit")]
    pub print_config: bool,
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) -> Result<(), MoverError> {
        if let Some(dir) = &self.local_dir {
            cfg.local_dir = dir.clone();
        }
        if let Some(dir) = &self.remote_dir {
            cfg.remote_dir = dir.clone();
        }
        if let Some(raw) = &self.filter {
            cfg.file_filter = FileFilter::parse(raw)?;
        }
        if let Some(secs) = self.stability_wait {
            cfg.stability_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = self.scan_interval {
            cfg.scan_interval = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_workers {
            cfg.max_workers = n;
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if self.verify_checksum {
            cfg.verify_checksum = true;
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
        Ok(())
    }
}

pub fn parse() -> Args {
    Args::parse()
}
