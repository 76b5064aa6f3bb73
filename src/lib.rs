//! Core library for `file_mover`.
//!
//! Watches a flat staging directory, waits until each file stops growing, then
//! moves it to an archive directory under a per-file lock marker: copy to a
//! temp name, optional SHA-256 check, atomic rename, source removal. Transfers
//! run on a bounded pool and are retried with exponential backoff.

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod fs_ops;
pub mod output;
pub mod platform;
pub mod pool;
pub mod scan;
pub mod shutdown;
pub mod stability;
pub mod stats;

pub use config::{Config, FileFilter, LogLevel, default_config_path, default_log_path, path_has_symlink_ancestor};
pub use errors::MoverError;
pub use events::{Event, EventSink, MemorySink, TracingSink};
pub use fs_ops::{
    Filesystem, LocalFs, LockToken, MAX_ATTEMPTS, RetryPolicy, RetryState, SkipReason, TransferExecutor,
    TransferOutcome, TransferSettings,
};
pub use pool::WorkerPool;
pub use scan::{CandidateFile, Phase, ScanLoop, ScanReport};
pub use shutdown::Shutdown;
pub use stability::{Stability, StabilityDetector};
pub use stats::{ActivityTracker, RunStatistics};
