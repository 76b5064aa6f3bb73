//! Core configuration types.
//! - Config holds runtime settings with sensible defaults.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::filter::FileFilter;
use super::paths;
use super::{
    DEFAULT_HEALTH_INTERVAL, DEFAULT_INACTIVITY_THRESHOLD, DEFAULT_MAX_WORKERS,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_DELAY, DEFAULT_SCAN_INTERVAL,
    DEFAULT_STABILITY_WAIT,
};

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Backoff parameters between transfer attempts. The attempt cap itself is
/// fixed (`fs_ops::MAX_ATTEMPTS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failed attempt; doubled after each further failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

/// Runtime configuration used by the mover.
#[derive(Debug, Clone)]
pub struct Config {
    /// Staging directory the producer writes into
    pub local_dir: PathBuf,
    /// Archive directory finished files are moved to
    pub remote_dir: PathBuf,
    /// How long a file's size must stay constant before it is considered finished
    pub stability_wait: Duration,
    /// Pause between scan cycles
    pub scan_interval: Duration,
    /// No successful move for this long raises one inactivity warning
    pub inactivity_threshold: Duration,
    /// Period of the health summary event
    pub health_interval: Duration,
    /// If true, report moves but do not touch the filesystem
    pub dry_run: bool,
    /// Which filenames are candidates
    pub file_filter: FileFilter,
    /// Compare SHA-256 of source and copy before the final rename
    pub verify_checksum: bool,
    /// Upper bound on concurrent transfers
    pub max_workers: usize,
    pub backoff: Backoff,
    /// Copy access/modify times onto the archived file
    pub preserve_timestamps: bool,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::new(),
            remote_dir: PathBuf::new(),
            stability_wait: DEFAULT_STABILITY_WAIT,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            inactivity_threshold: DEFAULT_INACTIVITY_THRESHOLD,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            dry_run: false,
            file_filter: FileFilter::Any,
            verify_checksum: false,
            max_workers: DEFAULT_MAX_WORKERS,
            backoff: Backoff::default(),
            preserve_timestamps: false,
            log_level: LogLevel::Normal,
            log_file: paths::default_log_path(),
        }
    }
}

impl Config {
    /// Construct a Config with explicit directories; other fields use defaults.
    pub fn new(local_dir: impl Into<PathBuf>, remote_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_dir: local_dir.into(),
            remote_dir: remote_dir.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parse_aliases() {
        assert_eq!(LogLevel::parse("ERROR"), Some(LogLevel::Quiet));
        assert_eq!(LogLevel::parse("verbose"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("trace"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("loud"), None);
        assert!("nope".parse::<LogLevel>().is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::new("/in", "/out");
        assert_eq!(cfg.stability_wait, Duration::from_secs(5));
        assert_eq!(cfg.scan_interval, Duration::from_secs(10));
        assert_eq!(cfg.inactivity_threshold, Duration::from_secs(5 * 60));
        assert_eq!(cfg.max_workers, 4);
        assert!(!cfg.dry_run);
        assert!(!cfg.verify_checksum);
        assert!(matches!(cfg.file_filter, FileFilter::Any));
    }
}
