//! Timestamp preservation.
//! Copies access/modify times from the source onto the temp copy before it is
//! published, so the archive keeps acquisition times.

use filetime::{FileTime, set_file_times};
use std::fs;
use std::io;
use std::path::Path;

pub(crate) fn preserve_timestamps(src: &Path, dest: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;
    let mtime = FileTime::from_last_modification_time(&meta);
    let atime = FileTime::from_last_access_time(&meta);
    set_file_times(dest, atime, mtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtime_is_copied() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("a.rhd");
        let dst = td.path().join("a.rhd.tmp");
        fs::write(&src, b"x").unwrap();
        fs::write(&dst, b"x").unwrap();
        let old = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, old).unwrap();

        preserve_timestamps(&src, &dst).unwrap();
        let got = FileTime::from_last_modification_time(&fs::metadata(&dst).unwrap());
        assert_eq!(got, old);
    }
}
