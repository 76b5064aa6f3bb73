//! Filesystem seam used by the transfer sequence.
//!
//! Every side effect a transfer attempt performs on file contents goes through
//! [`Filesystem`], so a test can substitute a backend that fails on demand
//! (a dropped share, a full disk) without touching the real disk layout.
//! Lock markers are deliberately not part of the seam: their exclusivity
//! comes from the OS and is exercised for real.

use std::io;
use std::path::Path;

use super::{atomic, digest, io_copy};

pub trait Filesystem: Send + Sync {
    /// Copy `src` to `tmp`, overwriting `tmp`. Returns bytes written.
    fn copy(&self, src: &Path, tmp: &Path) -> io::Result<u64>;

    /// Lowercase hex SHA-256 of the file contents.
    fn digest(&self, path: &Path) -> io::Result<String>;

    /// Same-directory rename of `tmp` onto `dest`.
    fn rename(&self, tmp: &Path, dest: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Bytes available to this process in the directory holding `path`.
    fn free_space(&self, dir: &Path) -> io::Result<u64>;
}

/// The real local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn copy(&self, src: &Path, tmp: &Path) -> io::Result<u64> {
        io_copy::copy_to_temp(src, tmp)
    }

    fn digest(&self, path: &Path) -> io::Result<String> {
        digest::sha256_file(path)
    }

    fn rename(&self, tmp: &Path, dest: &Path) -> io::Result<()> {
        atomic::rename_into_place(tmp, dest)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn free_space(&self, dir: &Path) -> io::Result<u64> {
        crate::platform::free_space_bytes(dir)
    }
}
