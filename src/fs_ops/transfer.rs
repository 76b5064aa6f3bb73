//! Locked, verified, atomic move of one file.
//!
//! Sequence per dispatch:
//! 1. Exclusive-create `<name>.lock` next to the source (`AlreadyLocked` -> skip).
//! 2. Copy to `<name>.tmp` in the remote directory, overwriting stale temps.
//! 3. Optionally compare SHA-256 of source and temp.
//! 4. Rename the temp onto the final name in the same directory.
//! 5. Remove the source, then the lock marker.
//!
//! Steps 2-4 form one attempt and are driven by [`RetryState`]. The source is
//! never removed unless step 4 succeeded. Exactly one [`TransferOutcome`] is
//! returned per call.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::backend::{Filesystem, LocalFs};
use super::helpers::transient;
use super::lock::LockToken;
use super::retry::{MAX_ATTEMPTS, RetryEvent, RetryPolicy, RetryState};
use super::util::{temp_path_for, unique_destination};
use super::{meta, space};
use crate::config::Config;
use crate::errors::MoverError;
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Another transfer holds the lock marker.
    AlreadyLocked,
    /// The source disappeared before the transfer began.
    Vanished,
    /// The lock marker could not be created for another reason.
    LockUnavailable(String),
}

/// Terminal result of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Moved {
        filename: String,
        dest: PathBuf,
        bytes: u64,
        duration: Duration,
        attempts: u32,
        /// Dry-run: nothing was touched.
        simulated: bool,
    },
    Failed {
        filename: String,
        reason: String,
        attempts: u32,
    },
    Skipped {
        filename: String,
        reason: SkipReason,
    },
}

impl TransferOutcome {
    pub fn filename(&self) -> &str {
        match self {
            TransferOutcome::Moved { filename, .. }
            | TransferOutcome::Failed { filename, .. }
            | TransferOutcome::Skipped { filename, .. } => filename,
        }
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, TransferOutcome::Moved { .. })
    }
}

/// Per-transfer knobs, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub remote_dir: PathBuf,
    pub verify_checksum: bool,
    pub preserve_timestamps: bool,
    pub dry_run: bool,
    pub retry: RetryPolicy,
}

impl TransferSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            remote_dir: cfg.remote_dir.clone(),
            verify_checksum: cfg.verify_checksum,
            preserve_timestamps: cfg.preserve_timestamps,
            dry_run: cfg.dry_run,
            retry: RetryPolicy::from(&cfg.backoff),
        }
    }
}

pub struct TransferExecutor {
    settings: TransferSettings,
    fs: Arc<dyn Filesystem>,
    shutdown: Shutdown,
}

impl TransferExecutor {
    pub fn new(settings: TransferSettings, shutdown: Shutdown) -> Self {
        Self {
            settings,
            fs: Arc::new(LocalFs),
            shutdown,
        }
    }

    /// Replace the filesystem backend (fault injection in tests).
    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Move `src` into the remote directory. Never panics, never returns early
    /// without an outcome, never removes the source on failure.
    pub fn execute(&self, src: &Path) -> TransferOutcome {
        let filename = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if filename.is_empty() {
            return TransferOutcome::Failed {
                filename: src.display().to_string(),
                reason: "path has no file name".into(),
                attempts: 0,
            };
        }

        if self.settings.dry_run {
            return self.simulate(src, filename);
        }

        let lock = match LockToken::acquire(src) {
            Ok(lock) => lock,
            Err(MoverError::AlreadyLocked(path)) => {
                debug!(file = %filename, lock = %path.display(), "already locked; skipping");
                return TransferOutcome::Skipped {
                    filename,
                    reason: SkipReason::AlreadyLocked,
                };
            }
            Err(e) => {
                warn!(file = %filename, code = e.code(), error = %e, "cannot create lock marker; skipping");
                return TransferOutcome::Skipped {
                    filename,
                    reason: SkipReason::LockUnavailable(e.to_string()),
                };
            }
        };

        // A concurrent dispatch may have finished this file between listing and locking.
        if fs::symlink_metadata(src).is_err() {
            debug!(file = %filename, "source vanished before transfer");
            if let Err(e) = lock.release() {
                warn!(file = %filename, error = %e, "failed to remove lock marker");
            }
            return TransferOutcome::Skipped {
                filename,
                reason: SkipReason::Vanished,
            };
        }

        self.run_attempts(src, filename, lock)
    }

    fn run_attempts(&self, src: &Path, filename: String, lock: LockToken) -> TransferOutcome {
        let started = Instant::now();
        let policy = self.settings.retry;
        let mut state = policy.start();
        let mut completed: Option<(PathBuf, u64)> = None;
        let mut last_error: Option<MoverError> = None;

        loop {
            state = match state {
                RetryState::Attempting(n) => {
                    debug!(file = %filename, attempt = n, max = MAX_ATTEMPTS, "transfer attempt");
                    match self.attempt(src) {
                        Ok(done) => {
                            completed = Some(done);
                            state.advance(RetryEvent::AttemptSucceeded, &policy)
                        }
                        Err(e) => {
                            warn!(
                                file = %filename,
                                attempt = n,
                                max = MAX_ATTEMPTS,
                                code = e.code(),
                                error = %e,
                                "transfer attempt failed"
                            );
                            let retryable = e.is_retryable();
                            last_error = Some(e);
                            state.advance(RetryEvent::AttemptFailed { retryable }, &policy)
                        }
                    }
                }
                RetryState::Waiting { next, delay } => {
                    info!(
                        file = %filename,
                        next_attempt = next,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after backoff"
                    );
                    if self.shutdown.wait_timeout(delay) {
                        last_error = Some(MoverError::Interrupted);
                        RetryState::Exhausted { attempts: next - 1 }
                    } else {
                        state.advance(RetryEvent::DelayElapsed, &policy)
                    }
                }
                RetryState::Succeeded { attempts } => {
                    let (dest, bytes) = completed.unwrap_or_default();
                    return self.finish_success(src, filename, lock, dest, bytes, attempts, started.elapsed());
                }
                RetryState::Exhausted { attempts } => {
                    return self.finish_failure(src, filename, lock, last_error, attempts);
                }
            };
        }
    }

    /// One copy/verify/rename pass. Leaves no temp behind on failure.
    fn attempt(&self, src: &Path) -> Result<(PathBuf, u64), MoverError> {
        let remote = &self.settings.remote_dir;
        let name = src.file_name().unwrap_or_default();
        let nominal = remote.join(name);
        let tmp = temp_path_for(&nominal);

        let size = fs::metadata(src).map_err(transient("read source metadata", src))?.len();
        let free = self.fs.free_space(remote).map_err(transient("query free space", remote))?;
        space::ensure_space_for_copy(&nominal, size, free)?;

        let bytes = self
            .fs
            .copy(src, &tmp)
            .map_err(|e| self.discard_temp(&tmp, transient("copy to temporary file", &tmp)(e)))?;

        if self.settings.verify_checksum {
            let expected = self
                .fs
                .digest(src)
                .map_err(|e| self.discard_temp(&tmp, transient("hash source", src)(e)))?;
            let actual = self
                .fs
                .digest(&tmp)
                .map_err(|e| self.discard_temp(&tmp, transient("hash temporary copy", &tmp)(e)))?;
            if expected != actual {
                return Err(self.discard_temp(
                    &tmp,
                    MoverError::VerificationFailed {
                        path: src.to_path_buf(),
                        expected,
                        actual,
                    },
                ));
            }
            debug!(file = %nominal.display(), sha256 = %expected, "checksum verified");
        }

        if self.settings.preserve_timestamps
            && let Err(e) = meta::preserve_timestamps(src, &tmp)
        {
            warn!(file = %tmp.display(), error = %e, "could not preserve timestamps");
        }

        // Chosen just before publishing so an archive written meanwhile is not overwritten.
        let dest = unique_destination(&nominal);
        self.fs
            .rename(&tmp, &dest)
            .map_err(|e| self.discard_temp(&tmp, transient("rename into place", &dest)(e)))?;
        Ok((dest, bytes))
    }

    fn discard_temp(&self, tmp: &Path, err: MoverError) -> MoverError {
        if let Err(e) = self.fs.remove_file(tmp)
            && e.kind() != io::ErrorKind::NotFound
        {
            debug!(file = %tmp.display(), error = %e, "could not remove temporary file");
        }
        err
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_success(
        &self,
        src: &Path,
        filename: String,
        lock: LockToken,
        dest: PathBuf,
        bytes: u64,
        attempts: u32,
        duration: Duration,
    ) -> TransferOutcome {
        match self.fs.remove_file(src) {
            Ok(()) => {
                if let Err(e) = lock.release() {
                    warn!(file = %filename, error = %e, "failed to remove lock marker");
                }
            }
            Err(e) => {
                // Keeping the marker stops the next scan from archiving a duplicate.
                let marker = lock.persist();
                error!(
                    file = %filename,
                    dest = %dest.display(),
                    lock = %marker.display(),
                    error = %e,
                    "archived but source could not be removed; lock marker kept"
                );
            }
        }
        info!(
            file = %filename,
            dest = %dest.display(),
            bytes,
            attempts,
            elapsed_ms = duration.as_millis() as u64,
            "file moved"
        );
        TransferOutcome::Moved {
            filename,
            dest,
            bytes,
            duration,
            attempts,
            simulated: false,
        }
    }

    fn finish_failure(
        &self,
        src: &Path,
        filename: String,
        lock: LockToken,
        last_error: Option<MoverError>,
        attempts: u32,
    ) -> TransferOutcome {
        if let Err(e) = lock.release() {
            warn!(file = %filename, error = %e, "failed to remove lock marker");
        }
        let reason = match last_error {
            Some(MoverError::Interrupted) => MoverError::Interrupted.to_string(),
            Some(e) => MoverError::RetryExhausted {
                path: src.to_path_buf(),
                attempts,
                reason: e.to_string(),
            }
            .to_string(),
            None => "unknown failure".to_string(),
        };
        error!(file = %filename, attempts, reason = %reason, "transfer failed; source kept");
        TransferOutcome::Failed {
            filename,
            reason,
            attempts,
        }
    }

    fn simulate(&self, src: &Path, filename: String) -> TransferOutcome {
        let bytes = match fs::metadata(src) {
            Ok(m) => m.len(),
            Err(_) => {
                return TransferOutcome::Skipped {
                    filename,
                    reason: SkipReason::Vanished,
                };
            }
        };
        let dest = self.settings.remote_dir.join(&filename);
        info!(file = %filename, dest = %dest.display(), bytes, "[dry-run] would move file");
        TransferOutcome::Moved {
            filename,
            dest,
            bytes,
            duration: Duration::ZERO,
            attempts: 1,
            simulated: true,
        }
    }
}
