//! Streaming copy into the in-progress temp file.
//!
//! Features:
//! - Opens the destination with truncate, so a stale `<name>.tmp` left by an
//!   aborted attempt is fully overwritten rather than appended to.
//! - Buffered I/O with large (1 MiB) buffers to reduce syscall count.
//! - Linux: in-kernel `copy_file_range` fast path, falling back to streaming.
//! - Always ends with `sync_all` so the rename publishes durable bytes.
//!
//! Snapshot semantics: the source is read once from start to EOF; the stability
//! check upstream guarantees it is no longer growing.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

const BUF_SIZE: usize = 1024 * 1024;

/// Copy `src` -> `tmp`, replacing any previous contents of `tmp`.
/// Returns the number of bytes written.
pub(crate) fn copy_to_temp(src: &Path, tmp: &Path) -> io::Result<u64> {
    let src_f = File::open(src)?;

    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_CLOEXEC);
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        const FILE_FLAG_WRITE_THROUGH: u32 = 0x8000_0000;
        opts.custom_flags(FILE_FLAG_WRITE_THROUGH);
    }

    let dst_f = opts.open(tmp)?;

    #[cfg(target_os = "linux")]
    if let Some(total) = copy_file_range_all(&src_f, &dst_f)? {
        dst_f.sync_all()?;
        return Ok(total);
    }

    let mut reader = BufReader::with_capacity(BUF_SIZE, src_f);
    let mut writer = BufWriter::with_capacity(BUF_SIZE, dst_f);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(bytes)
}

/// In-kernel copy. `Ok(None)` when unsupported before any byte moved, so the
/// caller falls back to streaming.
#[cfg(target_os = "linux")]
fn copy_file_range_all(src: &File, dst: &File) -> io::Result<Option<u64>> {
    use std::os::unix::io::AsRawFd;

    const CHUNK: usize = 16 * 1024 * 1024;
    let mut total: u64 = 0;
    loop {
        // SAFETY: both fds are open for the duration of the call; null offsets
        // use and advance the file positions.
        let rc = unsafe {
            libc::copy_file_range(
                src.as_raw_fd(),
                std::ptr::null_mut(),
                dst.as_raw_fd(),
                std::ptr::null_mut(),
                CHUNK,
                0,
            )
        };
        if rc > 0 {
            total += rc as u64;
            continue;
        }
        if rc == 0 {
            return Ok(Some(total));
        }
        let err = io::Error::last_os_error();
        let unsupported = matches!(
            err.raw_os_error(),
            Some(libc::EXDEV | libc::ENOSYS | libc::EINVAL | libc::EPERM | libc::EOPNOTSUPP)
        );
        if total == 0 && unsupported {
            return Ok(None);
        }
        return Err(err);
    }
}
