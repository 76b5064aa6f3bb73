use std::path::Path;

use crate::errors::MoverError;

/// Headroom kept free on the destination beyond the file itself.
pub const SPACE_CUSHION: u64 = 4 * 1024 * 1024;

pub(crate) fn format_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let f = n as f64;
    if f >= GB {
        format!("{:.1} GiB", f / GB)
    } else if f >= MB {
        format!("{:.1} MiB", f / MB)
    } else if f >= KB {
        format!("{:.1} KiB", f / KB)
    } else {
        format!("{} B", n)
    }
}

/// Fail with `InsufficientSpace` unless `available` covers `required` plus the cushion.
pub(crate) fn ensure_space_for_copy(dest: &Path, required: u64, available: u64) -> Result<(), MoverError> {
    if available < required.saturating_add(SPACE_CUSHION) {
        tracing::warn!(
            dest = %dest.display(),
            need = %format_bytes(required),
            free = %format_bytes(available),
            "not enough free space for copy"
        );
        return Err(MoverError::InsufficientSpace {
            required,
            available,
            dest: dest.to_path_buf(),
        });
    }
    Ok(())
}
