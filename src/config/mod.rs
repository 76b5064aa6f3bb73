//! Config module.
//! Provides configuration types, default paths, XML loading, filename filtering
//! and startup validation.

pub mod filter;
pub mod paths;
pub mod types;
mod validate;
pub mod xml;

use std::time::Duration;

pub use filter::FileFilter;
pub use paths::{default_config_path, default_log_path, path_has_symlink_ancestor, CONFIG_ENV};
pub use types::{Backoff, Config, LogLevel};
pub use validate::validate_and_normalize;
pub use xml::{create_template_config, load_config_from_xml_path, load_or_init, parse_config_xml, LoadResult};

/// Defaults shared across submodules.
pub const DEFAULT_STABILITY_WAIT: Duration = Duration::from_secs(5);
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
