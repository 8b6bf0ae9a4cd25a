//! Scoped output redirection.
//!
//! Two mechanisms, matching what each can actually see:
//!
//! - [`SinkGuard`]: a thread-scoped buffer sink. Anything written through
//!   [`stdout_writer`]/[`stderr_writer`] (including the subscriber's main
//!   format layer) lands in the active phase's buffers. Misses raw
//!   descriptor writes and child processes.
//! - [`FdRedirect`]: swaps OS descriptors 1 and 2 for temp files, catching
//!   child-process output and direct descriptor writes. Restores the saved
//!   descriptors on every exit path, including unwinding.
//!
//! Both degrade rather than fail: a sink conflict (capture already active on
//! this thread) passes writes through untouched, and descriptor-swap errors
//! surface to the caller so the controller can disable the mode.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::warn;

type SharedBuffer = Rc<RefCell<Vec<u8>>>;

struct ActiveSink {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

thread_local! {
    static ACTIVE: RefCell<Option<ActiveSink>> = const { RefCell::new(None) };
}

/// Scoped buffer capture for the current thread.
///
/// Installs fresh buffers on creation and removes them on drop, so a panic
/// inside the scope still restores passthrough before propagating.
pub struct SinkGuard {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    installed: bool,
}

impl SinkGuard {
    pub fn install() -> SinkGuard {
        // The thread-local borrow must be released before any logging:
        // subscriber output routes back through this same cell.
        let buffers = ACTIVE.with(|active| {
            let mut slot = active.borrow_mut();
            if slot.is_some() {
                return None;
            }
            let stdout = SharedBuffer::default();
            let stderr = SharedBuffer::default();
            *slot = Some(ActiveSink {
                stdout: Rc::clone(&stdout),
                stderr: Rc::clone(&stderr),
            });
            Some((stdout, stderr))
        });

        match buffers {
            Some((stdout, stderr)) => SinkGuard {
                stdout,
                stderr,
                installed: true,
            },
            None => {
                warn!("output capture already active on this thread, degrading to passthrough");
                SinkGuard {
                    stdout: SharedBuffer::default(),
                    stderr: SharedBuffer::default(),
                    installed: false,
                }
            }
        }
    }

    /// Release the sink and return the captured (stdout, stderr) text.
    pub fn finish(mut self) -> (String, String) {
        self.release();
        let stdout = String::from_utf8_lossy(&self.stdout.borrow()).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr.borrow()).into_owned();
        (stdout, stderr)
    }

    fn release(&mut self) {
        if self.installed {
            ACTIVE.with(|active| active.borrow_mut().take());
            self.installed = false;
        }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Write handle that routes to the active capture sink, or passes through to
/// the real stream when no capture is active on this thread.
pub struct CaptureStream {
    kind: StreamKind,
}

/// Capture-aware stdout handle, suitable as a subscriber `MakeWriter`.
pub fn stdout_writer() -> CaptureStream {
    CaptureStream {
        kind: StreamKind::Stdout,
    }
}

/// Capture-aware stderr handle, suitable as a subscriber `MakeWriter`.
pub fn stderr_writer() -> CaptureStream {
    CaptureStream {
        kind: StreamKind::Stderr,
    }
}

impl Write for CaptureStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let routed = ACTIVE.with(|active| {
            let slot = active.borrow();
            match slot.as_ref() {
                Some(sink) => {
                    let target = match self.kind {
                        StreamKind::Stdout => &sink.stdout,
                        StreamKind::Stderr => &sink.stderr,
                    };
                    target.borrow_mut().extend_from_slice(buf);
                    true
                }
                None => false,
            }
        });
        if routed {
            return Ok(buf.len());
        }
        match self.kind {
            StreamKind::Stdout => io::stdout().write(buf),
            StreamKind::Stderr => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.kind {
            StreamKind::Stdout => io::stdout().flush(),
            StreamKind::Stderr => io::stderr().flush(),
        }
    }
}

/// Raw descriptor redirection for stdout/stderr.
///
/// Saved descriptors are restored on [`FdRedirect::finish`] or, as a
/// backstop, on drop.
pub struct FdRedirect {
    saved_stdout: RawFd,
    saved_stderr: RawFd,
    stdout_file: File,
    stderr_file: File,
    restored: bool,
}

impl FdRedirect {
    pub fn install() -> Result<FdRedirect> {
        let stdout_file = tempfile::tempfile().context("create stdout capture file")?;
        let stderr_file = tempfile::tempfile().context("create stderr capture file")?;

        // Flush buffered writes so they land on the original descriptors.
        io::stdout().flush().ok();
        io::stderr().flush().ok();

        let saved_stdout = dup(libc::STDOUT_FILENO).context("save stdout descriptor")?;
        let saved_stderr = match dup(libc::STDERR_FILENO) {
            Ok(fd) => fd,
            Err(err) => {
                close(saved_stdout);
                return Err(err).context("save stderr descriptor");
            }
        };
        if let Err(err) = dup2(stdout_file.as_raw_fd(), libc::STDOUT_FILENO) {
            close(saved_stdout);
            close(saved_stderr);
            return Err(err).context("redirect stdout descriptor");
        }
        if let Err(err) = dup2(stderr_file.as_raw_fd(), libc::STDERR_FILENO) {
            let _ = dup2(saved_stdout, libc::STDOUT_FILENO);
            close(saved_stdout);
            close(saved_stderr);
            return Err(err).context("redirect stderr descriptor");
        }

        Ok(FdRedirect {
            saved_stdout,
            saved_stderr,
            stdout_file,
            stderr_file,
            restored: false,
        })
    }

    /// Restore the saved descriptors and return the captured text.
    pub fn finish(mut self) -> Result<(String, String)> {
        self.restore();
        let stdout = read_capture(&mut self.stdout_file).context("read stdout capture")?;
        let stderr = read_capture(&mut self.stderr_file).context("read stderr capture")?;
        Ok((stdout, stderr))
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        io::stdout().flush().ok();
        io::stderr().flush().ok();
        let _ = dup2(self.saved_stdout, libc::STDOUT_FILENO);
        let _ = dup2(self.saved_stderr, libc::STDERR_FILENO);
        close(self.saved_stdout);
        close(self.saved_stderr);
        self.restored = true;
    }
}

impl Drop for FdRedirect {
    fn drop(&mut self) {
        self.restore();
    }
}

fn read_capture(file: &mut File) -> Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0)).context("rewind capture file")?;
    file.read_to_end(&mut bytes).context("read capture file")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// Raw descriptor plumbing has no safe std equivalent.

#[allow(unsafe_code)]
fn dup(fd: RawFd) -> io::Result<RawFd> {
    let duped = unsafe { libc::dup(fd) };
    if duped < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(duped)
}

#[allow(unsafe_code)]
pub(crate) fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    if unsafe { libc::dup2(src, dst) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[allow(unsafe_code)]
fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}
