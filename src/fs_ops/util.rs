use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const TEMP_SUFFIX: &str = ".tmp";

/// In-progress name for `dest`: `<name>.tmp` in the same directory.
pub(crate) fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name: OsString = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    name.push(TEMP_SUFFIX);
    dest.with_file_name(name)
}

/// Return a unique destination by appending timestamp+pid when candidate exists.
/// - Preserves non-UTF8 names (uses OsString).
/// - Format: "<stem>-<millis>-<pid>[-<n>].<ext?>"
pub(crate) fn unique_destination(candidate: &Path) -> PathBuf {
    if !candidate.exists() {
        return candidate.to_path_buf();
    }

    let epoch_ms = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let pid = std::process::id();

    let stem = candidate
        .file_stem()
        .map(|s| s.to_owned())
        .unwrap_or_else(|| OsStr::new("file").to_owned());
    let ext = candidate.extension().map(|e| e.to_owned());

    let build = |suffix: String| {
        let mut name = OsString::new();
        name.push(&stem);
        name.push(suffix);
        if let Some(ref e) = ext {
            name.push(".");
            name.push(e);
        }
        candidate.with_file_name(name)
    };

    let dest = build(format!("-{epoch_ms}-{pid}"));
    if !dest.exists() {
        return dest;
    }
    for n in 2u32..=5 {
        let alt = build(format!("-{epoch_ms}-{pid}-{n}"));
        if !alt.exists() {
            return alt;
        }
    }
    build(format!("-{epoch_ms}-{pid}-final"))
}

#[cfg(unix)]
pub(crate) fn fsync_dir(dir: &Path) -> io::Result<()> {
    let f = File::open(dir)?;
    f.sync_all()
}

#[cfg(windows)]
pub(crate) fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn temp_name_keeps_extension_and_appends_tmp() {
        assert_eq!(temp_path_for(Path::new("/r/a.rhd")), PathBuf::from("/r/a.rhd.tmp"));
    }

    #[test]
    fn free_candidate_is_returned_as_is() {
        let td = tempfile::tempdir().unwrap();
        let c = td.path().join("a.rhd");
        assert_eq!(unique_destination(&c), c);
    }

    #[test]
    fn taken_candidate_gets_stamped_name() {
        let td = tempfile::tempdir().unwrap();
        let c = td.path().join("a.rhd");
        fs::write(&c, b"old").unwrap();
        let d = unique_destination(&c);
        assert_ne!(d, c);
        let name = d.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("a-"));
        assert!(name.ends_with(".rhd"));
        assert!(name.contains(&format!("-{}", std::process::id())));
    }
}
