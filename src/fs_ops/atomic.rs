//! Atomic publish of the temp copy.
//! - Same-directory rename only; the caller never crosses devices here.
//! - On Windows, removes an existing destination first (rename doesn't overwrite).
//! - On Unix, fsync of the destination directory after rename.

use std::fs;
use std::io;
use std::path::Path;

pub(crate) fn rename_into_place(tmp: &Path, dest: &Path) -> io::Result<()> {
    #[cfg(windows)]
    if let Err(e) = fs::remove_file(dest)
        && e.kind() != io::ErrorKind::NotFound
    {
        return Err(e);
    }

    fs::rename(tmp, dest)?;

    #[cfg(unix)]
    if let Some(parent) = dest.parent() {
        // A failed fsync must not turn a completed rename into a retry.
        let _ = super::util::fsync_dir(parent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_disappears_and_dest_appears() {
        let td = tempfile::tempdir().unwrap();
        let tmp = td.path().join("a.rhd.tmp");
        let dest = td.path().join("a.rhd");
        fs::write(&tmp, b"payload").unwrap();

        rename_into_place(&tmp, &dest).unwrap();
        assert!(!tmp.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }
}
