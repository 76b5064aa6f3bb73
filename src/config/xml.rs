//! XML configuration support.
//! - Loads settings from config.xml (quick_xml).
//! - Creates a secure template if the default file is missing.
//!
//! Notes:
//! - This module only reads/writes the config file; directory validation happens elsewhere.
//! - Unknown XML fields are rejected so misspelled settings surface early.

use anyhow::{Context, Result};
use quick_xml::de::from_str as from_xml_str;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::filter::FileFilter;
use super::paths::{default_config_path, default_log_path, path_has_symlink_ancestor, CONFIG_ENV};
use super::types::{Config, LogLevel};
use crate::platform::{set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    local_dir: Option<String>,
    remote_dir: Option<String>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    stability_wait_seconds: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    scan_interval_seconds: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    inactivity_threshold_minutes: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    health_interval_seconds: Option<u64>,
    #[serde(default, deserialize_with = "de_bool_trimmed_opt")]
    dry_run: Option<bool>,
    file_filter: Option<String>,
    #[serde(default, deserialize_with = "de_bool_trimmed_opt")]
    verify_checksum: Option<bool>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    max_workers: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    retry_base_delay_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    retry_max_delay_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_bool_trimmed_opt")]
    preserve_timestamps: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
}

// Numbers may be written with surrounding whitespace/newlines in hand-edited files.
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid number '{s}': {e}"))),
    }
}

fn de_bool_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => match s.as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!("invalid boolean '{other}'"))),
        },
    }
}

fn non_empty_path(s: Option<&str>) -> Option<PathBuf> {
    s.map(str::trim).filter(|t| !t.is_empty()).map(PathBuf::from)
}

// Map XmlConfig -> Config; absent fields keep their defaults.
fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(p) = non_empty_path(parsed.local_dir.as_deref()) {
        cfg.local_dir = p;
    }
    if let Some(p) = non_empty_path(parsed.remote_dir.as_deref()) {
        cfg.remote_dir = p;
    }
    if let Some(p) = non_empty_path(parsed.log_file.as_deref()) {
        cfg.log_file = Some(p);
    }
    if let Some(s) = parsed.log_level.as_deref()
        && let Ok(level) = s.trim().parse::<LogLevel>()
    {
        cfg.log_level = level;
    }

    if let Some(secs) = parsed.stability_wait_seconds {
        cfg.stability_wait = Duration::from_secs(secs);
    }
    if let Some(secs) = parsed.scan_interval_seconds {
        cfg.scan_interval = Duration::from_secs(secs);
    }
    if let Some(mins) = parsed.inactivity_threshold_minutes {
        let secs = mins.checked_mul(60).context("inactivity_threshold_minutes out of range")?;
        cfg.inactivity_threshold = Duration::from_secs(secs);
    }
    if let Some(secs) = parsed.health_interval_seconds {
        cfg.health_interval = Duration::from_secs(secs);
    }
    if let Some(n) = parsed.max_workers {
        cfg.max_workers = usize::try_from(n).context("max_workers out of range")?;
    }
    if let Some(ms) = parsed.retry_base_delay_ms {
        cfg.backoff.base_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed.retry_max_delay_ms {
        cfg.backoff.max_delay = Duration::from_millis(ms);
    }
    if let Some(raw) = parsed.file_filter.as_deref() {
        cfg.file_filter = FileFilter::parse(raw)?;
    }

    cfg.dry_run = parsed.dry_run.unwrap_or(false);
    cfg.verify_checksum = parsed.verify_checksum.unwrap_or(false);
    cfg.preserve_timestamps = parsed.preserve_timestamps.unwrap_or(false);

    Ok(cfg)
}

/// Parse a Config from XML text.
pub fn parse_config_xml(contents: &str) -> Result<Config> {
    let parsed: XmlConfig = from_xml_str(contents).context("parse config xml")?;
    xml_to_config(parsed)
}

/// Load a Config from a specific XML file path (quick_xml).
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    parse_config_xml(&contents).with_context(|| format!("load config '{}'", path.display()))
}

/// Outcome of looking for a config file at startup.
#[derive(Debug)]
pub enum LoadResult {
    Loaded(Config, PathBuf),
    /// No file existed at the default location; a template was written there.
    CreatedTemplate(PathBuf),
    /// No file and no template (explicit path missing, or no default location).
    Missing(Option<PathBuf>),
}

/// Resolve and load the config file.
/// Precedence: `explicit` > `$FILE_MOVER_CONFIG` > OS default path.
/// Only the OS default location gets a template written when missing.
pub fn load_or_init(explicit: Option<&Path>) -> Result<LoadResult> {
    let env_set = std::env::var_os(CONFIG_ENV).is_some();
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(LoadResult::Missing(None)),
        },
    };

    if path.exists() {
        let cfg = load_config_from_xml_path(&path)?;
        return Ok(LoadResult::Loaded(cfg, path));
    }
    if explicit.is_none() && !env_set {
        create_template_config(&path)?;
        return Ok(LoadResult::CreatedTemplate(path));
    }
    Ok(LoadResult::Missing(Some(path)))
}

/// Create default template config file and parent directory (best-effort permissions).
/// Uses secure creation to avoid following attacker-controlled symlinks on Unix.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        return Err(anyhow::anyhow!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }

    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/path/to/file_mover.log".into());

    let content = format!(
        "<!--\n  file_mover configuration (XML)\n\n    local_dir                     -> staging directory the acquisition device writes into\n    remote_dir                    -> archive directory finished files are moved to\n    stability_wait_seconds        -> size must stay constant this long before a file is moved\n    scan_interval_seconds         -> pause between directory scans\n    inactivity_threshold_minutes  -> warn once when nothing was moved for this long\n    health_interval_seconds       -> period of the health summary\n    file_filter                   -> suffix (e.g. .rhd) or regex:<pattern>; empty = all files\n    verify_checksum               -> compare SHA-256 of source and copy before finalizing\n    max_workers                   -> concurrent transfers\n    retry_base_delay_ms           -> first backoff delay; doubles per failed attempt\n    retry_max_delay_ms            -> cap for a single backoff delay\n    preserve_timestamps           -> copy access/modify times onto the archived file\n    dry_run                       -> report moves without touching any file\n    log_level                     -> quiet | normal | info | debug\n    log_file                      -> path to log file (optional; stdout still used)\n\n  CLI flags override XML values.\n-->\n<config>\n  <local_dir></local_dir>\n  <remote_dir></remote_dir>\n  <stability_wait_seconds>5</stability_wait_seconds>\n  <scan_interval_seconds>10</scan_interval_seconds>\n  <inactivity_threshold_minutes>5</inactivity_threshold_minutes>\n  <health_interval_seconds>3600</health_interval_seconds>\n  <file_filter></file_filter>\n  <verify_checksum>false</verify_checksum>\n  <max_workers>4</max_workers>\n  <retry_base_delay_ms>2000</retry_base_delay_ms>\n  <retry_max_delay_ms>60000</retry_max_delay_ms>\n  <preserve_timestamps>false</preserve_timestamps>\n  <dry_run>false</dry_run>\n  <log_level>normal</log_level>\n  <log_file>{}</log_file>\n</config>\n",
        suggested_log
    );

    // Atomic, secure write (create_new on a 0600 temp + rename), then tighten perms.
    write_config_secure_new_0600(path, content.as_bytes())?;
    let _ = set_file_mode_0600(path);

    info!("Created template config at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let xml = r#"
<config>
  <local_dir>/data/incoming</local_dir>
  <remote_dir> /mnt/archive </remote_dir>
  <stability_wait_seconds> 7 </stability_wait_seconds>
  <scan_interval_seconds>3</scan_interval_seconds>
  <inactivity_threshold_minutes>2</inactivity_threshold_minutes>
  <file_filter>.rhd</file_filter>
  <verify_checksum>true</verify_checksum>
  <max_workers>8</max_workers>
  <retry_base_delay_ms>1500</retry_base_delay_ms>
  <log_level>debug</log_level>
</config>"#;
        let cfg = parse_config_xml(xml).unwrap();
        assert_eq!(cfg.local_dir, PathBuf::from("/data/incoming"));
        assert_eq!(cfg.remote_dir, PathBuf::from("/mnt/archive"));
        assert_eq!(cfg.stability_wait, Duration::from_secs(7));
        assert_eq!(cfg.scan_interval, Duration::from_secs(3));
        assert_eq!(cfg.inactivity_threshold, Duration::from_secs(120));
        assert!(cfg.file_filter.matches("x.rhd"));
        assert!(!cfg.file_filter.matches("x.txt"));
        assert!(cfg.verify_checksum);
        assert_eq!(cfg.max_workers, 8);
        assert_eq!(cfg.backoff.base_delay, Duration::from_millis(1500));
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert!(!cfg.dry_run);
    }

    #[test]
    fn empty_elements_keep_defaults() {
        let cfg = parse_config_xml(
            "<config><local_dir>/a</local_dir><remote_dir>/b</remote_dir><file_filter></file_filter><max_workers></max_workers></config>",
        )
        .unwrap();
        assert_eq!(cfg.max_workers, 4);
        assert!(cfg.file_filter.matches("anything"));
    }

    #[test]
    fn oversized_inactivity_threshold_is_an_error() {
        let err = parse_config_xml(
            "<config><inactivity_threshold_minutes>18446744073709551615</inactivity_threshold_minutes></config>",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("inactivity_threshold_minutes out of range"));
    }

    #[test]
    fn unknown_field_rejected() {
        let err = parse_config_xml("<config><download_base>/a</download_base></config>").unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn template_round_trips() {
        let td = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(td.path()).unwrap();
        let path = base.join("cfg").join("config.xml");
        create_template_config(&path).unwrap();
        let cfg = load_config_from_xml_path(&path).unwrap();
        assert_eq!(cfg.stability_wait, Duration::from_secs(5));
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.local_dir, PathBuf::new());
    }
}
