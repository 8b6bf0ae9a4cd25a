//! Child-process output capture.
//!
//! The buffer sink and descriptor redirect in the parent cannot see a child
//! process that was spawned before the redirect, or one that writes after
//! the parent restored its descriptors. For those, the controller exports
//! the per-unit artifact directory in an environment variable, and the child
//! calls [`configure_subprocess_capture`] at the top of its entrypoint to
//! redirect its own descriptors there.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing::warn;

use super::redirect;

/// Environment variable naming the per-unit artifact directory, exported by
/// the controller for the duration of each unit.
pub const SUBPROCESS_CAPTURE_ENV: &str = "LOGWIRE_CAPTURE_DIR";

static CONFIGURED: OnceCell<bool> = OnceCell::new();

/// File names include the pid so concurrent children never clobber each
/// other.
pub fn subprocess_file_names(pid: u32) -> (String, String) {
    (
        format!("subprocess-{pid}-stdout.txt"),
        format!("subprocess-{pid}-stderr.txt"),
    )
}

/// Redirect this process's own stdout/stderr descriptors into the artifact
/// directory named by [`SUBPROCESS_CAPTURE_ENV`].
///
/// Idempotent within a process. Returns `Ok(false)` (after one diagnostic)
/// when the variable is unset, so entrypoints can call it unconditionally.
pub fn configure_subprocess_capture() -> Result<bool> {
    if let Some(configured) = CONFIGURED.get() {
        return Ok(*configured);
    }

    let Some(dir) = std::env::var_os(SUBPROCESS_CAPTURE_ENV) else {
        warn!(env_var = SUBPROCESS_CAPTURE_ENV, "subprocess capture env not set");
        let _ = CONFIGURED.set(false);
        return Ok(false);
    };
    let dir = PathBuf::from(dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create capture directory {}", dir.display()))?;

    let (stdout_name, stderr_name) = subprocess_file_names(std::process::id());
    let stdout_file = open_capture_file(&dir.join(stdout_name))?;
    let stderr_file = open_capture_file(&dir.join(stderr_name))?;

    redirect::dup2(stdout_file.as_raw_fd(), libc::STDOUT_FILENO)
        .context("redirect subprocess stdout")?;
    redirect::dup2(stderr_file.as_raw_fd(), libc::STDERR_FILENO)
        .context("redirect subprocess stderr")?;

    // The descriptors must stay open for the process lifetime.
    std::mem::forget(stdout_file);
    std::mem::forget(stderr_file);

    let _ = CONFIGURED.set(true);
    Ok(true)
}

fn open_capture_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open capture file {}", path.display()))
}
