//! Typed error definitions for file_mover.
//! Per-file failures are retried or reported; only `Configuration` is fatal at startup.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoverError {
    /// Disk or network failure while copying, renaming or removing.
    #[error("{context}")]
    TransientIo {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Insufficient disk space for destination {dest}: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        required: u64,
        available: u64,
        dest: PathBuf,
    },

    #[error("Checksum mismatch for {path}: source {expected}, copy {actual}")]
    VerificationFailed {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Another transfer holds the lock marker. Benign; the file is skipped.
    #[error("{0} is already locked by another transfer")]
    AlreadyLocked(PathBuf),

    #[error("Giving up on {path} after {attempts} attempts: {reason}")]
    RetryExhausted {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation interrupted by shutdown request")]
    Interrupted,
}

impl MoverError {
    /// Stable numeric code for structured logs.
    pub fn code(&self) -> i32 {
        match self {
            MoverError::TransientIo { .. } => 10,
            MoverError::InsufficientSpace { .. } => 11,
            MoverError::VerificationFailed { .. } => 12,
            MoverError::AlreadyLocked(_) => 20,
            MoverError::RetryExhausted { .. } => 30,
            MoverError::Configuration(_) => 40,
            MoverError::Interrupted => 130,
        }
    }

    /// Whether another attempt of the copy/verify/rename sequence may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MoverError::TransientIo { .. }
                | MoverError::InsufficientSpace { .. }
                | MoverError::VerificationFailed { .. }
        )
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        MoverError::Configuration(msg.into())
    }
}
