//! Per-file lock marker.
//! A zero-byte sidecar `<original>.lock` next to the source file means "a transfer
//! owns this file; do not select it again".
//!
//! Design:
//! - Acquisition is a single exclusive create (O_CREAT|O_EXCL via `create_new`), so
//!   two scan cycles racing on the same file cannot both win.
//! - The marker is removed when the LockToken guard is released or dropped.
//! - Unix: created 0600 with O_CLOEXEC so worker children never inherit the fd.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use super::helpers::transient;
use crate::errors::MoverError;

pub const LOCK_SUFFIX: &str = ".lock";

/// Path of the lock marker for `src`: same directory, `<name>.lock`.
pub fn lock_path_for(src: &Path) -> PathBuf {
    let mut name: OsString = src
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    name.push(LOCK_SUFFIX);
    src.with_file_name(name)
}

/// True if a lock marker currently exists for `src`.
pub fn is_locked(src: &Path) -> bool {
    fs::symlink_metadata(lock_path_for(src)).is_ok()
}

/// True if `name` is itself a lock marker.
pub fn is_lock_marker(name: &str) -> bool {
    name.ends_with(LOCK_SUFFIX)
}

/// RAII guard for a held lock marker.
#[derive(Debug)]
pub struct LockToken {
    path: PathBuf,
    released: bool,
}

impl LockToken {
    /// Exclusively create the marker for `src`.
    /// `AlreadyLocked` if it exists; `TransientIo` for any other failure.
    pub fn acquire(src: &Path) -> Result<Self, MoverError> {
        let path = lock_path_for(src);
        let mut opts = OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        opts.custom_flags(libc::O_CLOEXEC).mode(0o600);

        match opts.open(&path) {
            Ok(_) => {
                trace!(path = %path.display(), "lock acquired");
                Ok(Self { path, released: false })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(MoverError::AlreadyLocked(path)),
            Err(e) => Err(transient("create lock marker", &path)(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the marker on disk so the file is never selected again.
    /// Used when the source could not be removed after a completed move.
    pub fn persist(mut self) -> PathBuf {
        self.released = true;
        std::mem::take(&mut self.path)
    }

    /// Remove the marker now, reporting failure instead of swallowing it.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                trace!(path = %self.path.display(), "lock released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(lock_path_for(Path::new("/l/a.rhd")), PathBuf::from("/l/a.rhd.lock"));
        assert!(is_lock_marker("a.rhd.lock"));
        assert!(!is_lock_marker("a.rhd"));
    }

    #[test]
    fn second_acquire_is_already_locked() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("a.rhd");
        fs::write(&src, b"x").unwrap();

        let first = LockToken::acquire(&src).unwrap();
        assert!(is_locked(&src));
        let err = LockToken::acquire(&src).unwrap_err();
        assert!(matches!(err, MoverError::AlreadyLocked(_)));

        first.release().unwrap();
        assert!(!is_locked(&src));
        let again = LockToken::acquire(&src).unwrap();
        drop(again);
        assert!(!is_locked(&src), "drop removes the marker");
    }

    #[test]
    fn concurrent_acquire_has_single_holder() {
        let td = tempfile::tempdir().unwrap();
        let src = Arc::new(td.path().join("race.rhd"));
        fs::write(&*src, b"x").unwrap();

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let holders = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let (src, barrier, holders, max_seen, wins) =
                    (src.clone(), barrier.clone(), holders.clone(), max_seen.clone(), wins.clone());
                thread::spawn(move || {
                    barrier.wait();
                    if let Ok(token) = LockToken::acquire(&src) {
                        wins.fetch_add(1, Ordering::SeqCst);
                        let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        holders.fetch_sub(1, Ordering::SeqCst);
                        token.release().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(wins.load(Ordering::SeqCst) >= 1);
    }
}
