//! CLI surface and resolved configuration for the capture plugin.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

/// Flags a harness binary exposes to enable output capture.
#[derive(Debug, Clone, Parser)]
#[command(name = "capture", about = "Persist per-unit output for failing test units")]
pub struct CaptureOptions {
    /// Enable output capture and write artifacts under DIR.
    #[arg(long, value_name = "DIR")]
    pub capture_output: Option<PathBuf>,

    /// Also redirect raw OS-level stdout/stderr (catches subprocess output).
    #[arg(long)]
    pub capture_fd: bool,

    /// Reuse DIR across suite runs instead of a per-run ephemeral directory.
    #[arg(long)]
    pub capture_keep: bool,

    /// Report passing units slower than this many seconds (0 disables).
    #[arg(long, value_name = "SECONDS", default_value_t = 1.0)]
    pub slow_threshold: f64,

    /// Disable all capture functionality.
    #[arg(long)]
    pub no_capture: bool,
}

/// Where artifacts land for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureRoot {
    /// Reused across runs; stale unit directories are cleaned lazily.
    Persistent(PathBuf),
    /// Fresh per-run directory, removed at finish when nothing was captured.
    Ephemeral(PathBuf),
}

impl CaptureRoot {
    pub fn path(&self) -> &Path {
        match self {
            CaptureRoot::Persistent(path) | CaptureRoot::Ephemeral(path) => path,
        }
    }
}

/// Resolved capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub root: CaptureRoot,
    pub fd_capture: bool,
    /// Slow-unit reporting threshold; `None` disables the report.
    pub slow_threshold: Option<Duration>,
}

impl CaptureConfig {
    /// Resolve the flag set. `Ok(None)` means the plugin stays disabled.
    pub fn from_options(options: &CaptureOptions) -> Result<Option<CaptureConfig>> {
        if options.no_capture {
            return Ok(None);
        }
        let Some(base) = &options.capture_output else {
            return Ok(None);
        };

        std::fs::create_dir_all(base)
            .with_context(|| format!("create capture root {}", base.display()))?;

        let root = if options.capture_keep {
            CaptureRoot::Persistent(base.clone())
        } else {
            let dir = tempfile::Builder::new()
                .prefix("run-")
                .tempdir_in(base)
                .with_context(|| format!("create per-run directory under {}", base.display()))?;
            // The run decides at finish whether this directory survives.
            CaptureRoot::Ephemeral(dir.keep())
        };

        let slow_threshold = (options.slow_threshold > 0.0)
            .then(|| Duration::from_secs_f64(options.slow_threshold));

        Ok(Some(CaptureConfig {
            root,
            fd_capture: options.capture_fd,
            slow_threshold,
        }))
    }
}
