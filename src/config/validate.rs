//! Config validation logic.
//! Verifies directory existence, readability/writability, distinct paths and sane
//! numeric settings. Every failure here is a `MoverError::Configuration`: the
//! mover refuses to start.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::types::Config;
use crate::errors::MoverError;

type Result<T> = std::result::Result<T, MoverError>;

impl Config {
    /// Validate existence, readability/writability and numeric settings.
    pub fn validate(&self) -> Result<()> {
        let local = &self.local_dir;
        let remote = &self.remote_dir;

        if local.as_os_str().is_empty() {
            return Err(MoverError::config("local_dir is not set"));
        }
        if remote.as_os_str().is_empty() {
            return Err(MoverError::config("remote_dir is not set"));
        }

        // 1) Local dir: must exist, be a directory, readable, and writable (lock markers live here).
        ensure_dir_exists_and_is_dir(local, "local_dir")?;
        ensure_readable(local, "local_dir")?;
        ensure_writable(local, "local_dir")?;

        // 2) Remote dir: must be a directory; create if missing; ensure writable.
        ensure_dir_is_or_create(remote, "remote_dir")?;
        ensure_writable(remote, "remote_dir")?;

        // 3) Resolve symlinks and ensure the directories differ.
        let local_real = dunce::canonicalize(local).unwrap_or_else(|_| local.clone());
        let remote_real = dunce::canonicalize(remote).unwrap_or_else(|_| remote.clone());
        if local_real == remote_real {
            return Err(MoverError::config(format!(
                "local_dir and remote_dir resolve to the same path: '{}'",
                local_real.display()
            )));
        }

        // 4) Numeric sanity.
        if self.max_workers == 0 {
            return Err(MoverError::config("max_workers must be at least 1"));
        }
        if self.scan_interval.is_zero() {
            return Err(MoverError::config("scan_interval must be greater than zero"));
        }
        if self.backoff.max_delay < self.backoff.base_delay {
            return Err(MoverError::config(
                "retry_max_delay_ms must not be smaller than retry_base_delay_ms",
            ));
        }

        info!(
            local = %local.display(),
            remote = %remote.display(),
            filter = %self.file_filter,
            max_workers = self.max_workers,
            dry_run = self.dry_run,
            "Config validated"
        );
        Ok(())
    }
}

/// Validate, then replace both directories with their canonical form.
pub fn validate_and_normalize(cfg: &mut Config) -> Result<()> {
    cfg.validate()?;
    cfg.local_dir = canonical(&cfg.local_dir)?;
    cfg.remote_dir = canonical(&cfg.remote_dir)?;
    Ok(())
}

fn canonical(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path)
        .map_err(|e| MoverError::config(format!("cannot resolve '{}': {e}", path.display())))
}

/// Ensure path exists and is a directory; emit clear errors with path context.
fn ensure_dir_exists_and_is_dir(path: &Path, name: &str) -> Result<()> {
    if !path.exists() {
        error!("{name} does not exist: {}", path.display());
        return Err(MoverError::config(format!("{name} does not exist: {}", path.display())));
    }
    if !path.is_dir() {
        error!("{name} is not a directory: {}", path.display());
        return Err(MoverError::config(format!("{name} is not a directory: {}", path.display())));
    }
    Ok(())
}

/// Ensure directory is readable by attempting to open its entries.
fn ensure_readable(path: &Path, name: &str) -> Result<()> {
    fs::read_dir(path).map_err(|e| {
        MoverError::config(format!(
            "Cannot read {name} directory '{}': {e}; check permissions",
            path.display()
        ))
    })?;
    debug!("{name} readable: {}", path.display());
    Ok(())
}

/// Ensure directory exists (create if missing). If exists, it must be a directory.
fn ensure_dir_is_or_create(path: &Path, name: &str) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            error!("{name} exists but isn't a directory: {}", path.display());
            return Err(MoverError::config(format!(
                "{name} exists but isn't a directory: {}",
                path.display()
            )));
        }
    } else {
        fs::create_dir_all(path).map_err(|e| {
            MoverError::config(format!("Failed to create {name} directory '{}': {e}", path.display()))
        })?;
        info!("Created {name} directory: {}", path.display());
    }
    Ok(())
}

/// Ensure directory is writable using a non-destructive probe file.
fn ensure_writable(path: &Path, name: &str) -> Result<()> {
    is_writable_probe(path).map_err(|e| {
        MoverError::config(format!("Cannot write to {name} '{}': {e}; check permissions", path.display()))
    })?;
    debug!("{name} writable: {}", path.display());
    Ok(())
}

/// Quick writable probe: create and remove a small file in `dir`.
/// Uses create_new to avoid clobbering existing files.
fn is_writable_probe(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(format!(".file_mover_probe_{}.tmp", std::process::id()));
    fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)?;
    let _ = fs::remove_file(&probe);
    Ok(())
}
