//! Test-harness output capture.
//!
//! Buffers stdout/stderr for every test unit across its setup → call →
//! teardown lifecycle and writes the buffers to disk only when the unit
//! fails. Passing units cost nothing on the filesystem.
//!
//! # Relationship to a harness's own capture
//!
//! Most harnesses already capture output and show it inline for failures.
//! This plugin instead persists it to organized per-unit files, which is
//! what CI needs. The two can coexist: if another capture is already active
//! on the thread, the phase scope degrades to passthrough with a warning
//! instead of fighting over the streams.
//!
//! # Capture modes
//!
//! The buffer sink sees everything written through [`stdout_writer`] /
//! [`stderr_writer`] (including the subscriber's format layer). It cannot
//! see child processes or raw descriptor writes; enable descriptor capture
//! ([`CaptureOptions::capture_fd`]) for those, and call
//! [`configure_subprocess_capture`] at the top of child entrypoints spawned
//! with fresh descriptors.
//!
//! # Output structure
//!
//! ```text
//! <root>/
//!     results.json                     # failure index for the whole run
//!     tests__auth__login/
//!         stdout.txt                   # only non-empty files are written
//!         stderr.txt
//!         exception.txt
//!         subprocess-4242-stdout.txt   # children, when fd capture is on
//! ```

pub mod artifacts;
pub mod controller;
pub mod options;
pub mod redirect;
pub mod report;
pub mod session;
pub mod subprocess;

pub use controller::{ActivePhase, CaptureController};
pub use options::{CaptureConfig, CaptureOptions, CaptureRoot};
pub use redirect::{CaptureStream, stderr_writer, stdout_writer};
pub use report::{CaptureReport, CapturedFailure, SlowUnit};
pub use session::{CaptureSession, Phase, PhaseBuffers, PhaseOutcome};
pub use subprocess::{SUBPROCESS_CAPTURE_ENV, configure_subprocess_capture};
