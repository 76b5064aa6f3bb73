//! I/O error enrichment.
//!
//! Wraps io::Error into `MoverError::TransientIo` with the operation, the path
//! and a platform-aware hint, so a `file_failed` reason is actionable on its own.
//!
//! Usage:
//!   fs::rename(&tmp, &dest).map_err(transient("rename into place", &dest))?;

use std::io;
use std::path::Path;

use crate::errors::MoverError;

fn hint_for(e: &io::Error) -> Option<&'static str> {
    #[cfg(unix)]
    if let Some(code) = e.raw_os_error() {
        let hint = match code {
            libc::EACCES | libc::EPERM => Some("permission denied; check ownership and write permissions"),
            libc::EXDEV => Some("cross-filesystem; atomic rename not possible"),
            libc::EBUSY => Some("resource busy; ensure no other process is writing"),
            libc::ENOENT => Some("path not found; the file or directory vanished"),
            libc::ENOSPC => Some("insufficient space on device"),
            libc::EROFS => Some("read-only filesystem"),
            libc::EIO => Some("low-level I/O error; check the device or network share"),
            libc::ESTALE | libc::ENOTCONN | libc::EHOSTDOWN => {
                Some("remote share unreachable; will retry")
            }
            libc::ENAMETOOLONG => Some("filename or path too long"),
            libc::EMFILE | libc::ENFILE => Some("too many open files"),
            _ => None,
        };
        if hint.is_some() {
            return hint;
        }
    }
    #[cfg(windows)]
    if let Some(code) = e.raw_os_error() {
        let hint = match code {
            5 => Some("access denied; check permissions"),
            17 => Some("not same device; atomic rename not possible"),
            32 => Some("sharing violation; file is in use"),
            2 | 3 => Some("path not found; the file or directory vanished"),
            53 | 64 | 67 => Some("network path unreachable; will retry"),
            112 => Some("insufficient disk space"),
            _ => None,
        };
        if hint.is_some() {
            return hint;
        }
    }
    match e.kind() {
        io::ErrorKind::PermissionDenied => Some("permission denied; check ownership and write permissions"),
        io::ErrorKind::NotFound => Some("path not found; the file or directory vanished"),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Some("busy or timed out; will retry"),
        _ => None,
    }
}

/// Format "<op> '<path>': <error>[ (<hint>)][ [os code: N]]".
pub(crate) fn describe(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);
    if let Some(hint) = hint_for(e) {
        msg.push_str(&format!(" ({hint})"));
    }
    if let Some(code) = e.raw_os_error() {
        msg.push_str(&format!(" [os code: {code}]"));
    }
    msg
}

/// Closure for `.map_err(...)` turning an io::Error into a retryable `TransientIo`.
pub(crate) fn transient<'a>(op: &'a str, path: &'a Path) -> impl FnOnce(io::Error) -> MoverError + 'a {
    move |e: io::Error| MoverError::TransientIo {
        context: describe(op, path, &e),
        source: e,
    }
}
