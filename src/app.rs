//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler,
//! validates the directories and runs the scan loop until stopped.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info};

use file_mover::cli::Args;
use file_mover::config::{CONFIG_ENV, LoadResult, load_or_init, validate_and_normalize};
use file_mover::output as out;
use file_mover::{Config, ScanLoop, Shutdown, TracingSink, default_config_path};

use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // Handle --print-config before logging init
    if args.print_config {
        print_config_location(&args);
        return Ok(());
    }

    let dirs_on_cli = args.local_dir.is_some() && args.remote_dir.is_some();
    let mut cfg = match load_or_init(args.config.as_deref())? {
        LoadResult::Loaded(cfg, _) => cfg,
        LoadResult::CreatedTemplate(path) => {
            out::print_success(&format!("A template file_mover config was written to: {}", path.display()));
            if !dirs_on_cli {
                out::print_info(
                    "Edit it to set `local_dir` and `remote_dir` (and optionally `file_filter`, `verify_checksum`, `max_workers`), then re-run.",
                );
                out::print_info(&format!("To use a different location set {CONFIG_ENV} or pass --config."));
                return Ok(());
            }
            Config::default()
        }
        LoadResult::Missing(Some(path)) if !dirs_on_cli => {
            let msg = format!("config file not found: {}", path.display());
            out::print_error(&msg);
            anyhow::bail!(msg);
        }
        LoadResult::Missing(_) => Config::default(),
    };

    args.apply_overrides(&mut cfg).inspect_err(|e| out::print_error(&e.to_string()))?;

    let guard = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json).inspect_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
    })?;

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            if !shutdown.is_requested() {
                out::print_warn("Received interrupt; finishing in-flight transfers...");
            }
            shutdown.request();
        })
        .context("install signal handler")?;
    }

    debug!(?args, "starting file_mover");

    let result = (|| -> Result<()> {
        if let Err(e) = validate_and_normalize(&mut cfg) {
            error!(code = e.code(), error = %e, "refusing to start");
            out::print_error(&e.to_string());
            return Err(e.into());
        }
        if cfg.dry_run {
            info!("dry-run: files will be reported but not touched");
        }

        let mut scan = ScanLoop::new(&cfg, Arc::new(TracingSink), shutdown.clone())?;
        let stats = if args.once { scan.run_once() } else { scan.run() };

        if let Some(rate) = stats.throughput() {
            info!(
                bytes = stats.bytes_moved,
                mib_per_sec = rate / (1024.0 * 1024.0),
                "transfer throughput"
            );
        }
        out::print_summary(stats.moved, stats.failed);
        Ok(())
    })();

    // Flush the file appender before exit
    drop(guard);
    result
}

fn print_config_location(args: &Args) {
    if let Some(p) = &args.config {
        out::print_info(&format!("Using --config (explicit):\n  {}\n", p.display()));
        return;
    }
    if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
        out::print_info(&format!(
            "Using {CONFIG_ENV} (explicit):\n  {}\n",
            std::path::Path::new(&env_path).display()
        ));
        out::print_info(&format!("To override, unset {CONFIG_ENV} or pass --config."));
        return;
    }
    match default_config_path() {
        Some(p) => {
            out::print_info(&format!("Default file_mover config path:\n  {}\n", p.display()));
            if p.exists() {
                out::print_info("A config file already exists at that location.");
            } else {
                out::print_info("No config file exists there yet. Run without --print-config to create a template.");
            }
        }
        None => out::print_error("Could not determine a default config path"),
    }
}
