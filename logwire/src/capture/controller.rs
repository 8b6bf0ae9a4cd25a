//! Per-unit capture lifecycle: phase scopes, outcome aggregation,
//! persistence on failure.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, warn};

use super::artifacts;
use super::options::{CaptureConfig, CaptureRoot};
use super::redirect::{FdRedirect, SinkGuard};
use super::report::{self, CaptureReport, CapturedFailure, SlowUnit};
use super::session::{CaptureSession, Phase, PhaseOutcome};
use super::subprocess::SUBPROCESS_CAPTURE_ENV;
use crate::panic_hook::payload_text;

/// Owns the per-unit sessions for one harness worker.
///
/// Each worker holds its own controller and drives one unit at a time, so
/// the session map needs no locking; isolation between workers comes from
/// the thread-scoped sink.
pub struct CaptureController {
    config: CaptureConfig,
    sessions: HashMap<String, CaptureSession>,
    failures: Vec<CapturedFailure>,
    slow: Vec<SlowUnit>,
    warnings: Vec<String>,
    fd_capture_disabled: bool,
}

/// Scoped capture for one phase of one unit.
///
/// Close it with [`CaptureController::end_phase`]; if it is dropped instead
/// (a panic unwinding past the harness), the sink and descriptors still
/// restore themselves, only the buffered output is lost.
pub struct ActivePhase {
    unit_id: String,
    phase: Phase,
    sink: SinkGuard,
    fd: Option<FdRedirect>,
    started: Instant,
}

impl CaptureController {
    pub fn new(config: CaptureConfig) -> CaptureController {
        CaptureController {
            config,
            sessions: HashMap::new(),
            failures: Vec::new(),
            slow: Vec::new(),
            warnings: Vec::new(),
            fd_capture_disabled: false,
        }
    }

    pub fn root(&self) -> &Path {
        self.config.root.path()
    }

    /// Start a unit: wipe stale artifacts from a previous run of the same
    /// unit and export the artifact directory for child processes.
    pub fn begin_unit(&mut self, unit_id: &str) {
        let dir = artifacts::artifact_dir(self.config.root.path(), unit_id);
        if matches!(self.config.root, CaptureRoot::Persistent(_))
            && let Err(err) = artifacts::clean_artifact_dir(&dir)
        {
            self.warnings
                .push(format!("{unit_id}: stale artifact cleanup: {err:#}"));
        }
        export_capture_dir(&dir);
    }

    /// Open a phase scope. The sink is installed before the caller runs any
    /// unit code, so no output can slip past it.
    pub fn begin_phase(&mut self, unit_id: &str, phase: Phase) -> ActivePhase {
        self.sessions.entry(unit_id.to_string()).or_default();

        // Descriptor redirect first: its diagnostics must reach the real
        // streams, not the sink installed below.
        let fd = if self.config.fd_capture && !self.fd_capture_disabled {
            match FdRedirect::install() {
                Ok(redirect) => Some(redirect),
                Err(err) => {
                    self.fd_capture_disabled = true;
                    warn!(
                        unit_id,
                        phase = %phase,
                        "descriptor capture disabled for the rest of the run: {err:#}"
                    );
                    None
                }
            }
        } else {
            None
        };
        let sink = SinkGuard::install();

        ActivePhase {
            unit_id: unit_id.to_string(),
            phase,
            sink,
            fd,
            started: Instant::now(),
        }
    }

    /// Close a phase scope, folding its buffers and outcome into the
    /// session.
    pub fn end_phase(&mut self, scope: ActivePhase, outcome: PhaseOutcome, error: Option<String>) {
        let ActivePhase {
            unit_id,
            phase,
            sink,
            fd,
            started,
        } = scope;

        let (mut stdout, mut stderr) = sink.finish();
        if let Some(fd) = fd {
            match fd.finish() {
                Ok((fd_stdout, fd_stderr)) => {
                    stdout.push_str(&fd_stdout);
                    stderr.push_str(&fd_stderr);
                }
                Err(err) => {
                    self.fd_capture_disabled = true;
                    warn!(
                        unit_id,
                        phase = %phase,
                        "descriptor capture disabled for the rest of the run: {err:#}"
                    );
                }
            }
        }

        let session = self.sessions.entry(unit_id).or_default();
        session.append_output(phase, &stdout, &stderr);
        session.record_outcome(phase, outcome, error);
        if phase == Phase::Call {
            session.set_call_duration(started.elapsed());
        }
    }

    /// Run one phase under capture and classify the result: `Ok` passes,
    /// `Err` fails, a panic errors. The panic stops here instead of taking
    /// the whole suite down.
    pub fn run_phase<F>(&mut self, unit_id: &str, phase: Phase, f: F) -> PhaseOutcome
    where
        F: FnOnce() -> Result<()>,
    {
        let scope = self.begin_phase(unit_id, phase);
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        let (outcome, error) = match outcome {
            Ok(Ok(())) => (PhaseOutcome::Passed, None),
            Ok(Err(err)) => (PhaseOutcome::Failed, Some(format!("{err:#}"))),
            Err(payload) => (PhaseOutcome::Errored, Some(payload_text(payload.as_ref()))),
        };
        self.end_phase(scope, outcome, error);
        outcome
    }

    /// Close out a unit once its whole lifecycle has run.
    ///
    /// Persists artifacts iff a phase failed or errored, then evicts the
    /// session either way so memory stays bounded across large suites.
    /// Returns the artifact directory when one was written to.
    pub fn end_unit(&mut self, unit_id: &str) -> Option<PathBuf> {
        remove_capture_dir_export();

        let Some(session) = self.sessions.remove(unit_id) else {
            return None;
        };

        if !session.should_persist() {
            if let (Some(threshold), Some(duration)) =
                (self.config.slow_threshold, session.call_duration())
                && duration >= threshold
            {
                self.slow.push(SlowUnit {
                    unit_id: unit_id.to_string(),
                    duration_secs: duration.as_secs_f64(),
                });
            }
            // A stale dir left behind by cleanup stays only if non-empty.
            let dir = artifacts::artifact_dir(self.config.root.path(), unit_id);
            if dir.exists() {
                let _ = std::fs::remove_dir(&dir);
            }
            debug!(unit_id, "unit passed, discarding captured output");
            return None;
        }

        let written = artifacts::write_artifacts(self.config.root.path(), unit_id, &session);
        for warning in &written.warnings {
            self.warnings.push(format!("{unit_id}: {warning}"));
        }

        self.failures.push(CapturedFailure {
            unit_id: unit_id.to_string(),
            artifact_dir: written.dir.clone(),
            error_summary: session.first_error().map(summary_line),
            duration_secs: session.call_duration().map(|d| d.as_secs_f64()),
        });

        debug!(unit_id, dir = %written.dir.display(), "captured output persisted");
        Some(written.dir)
    }

    /// Finish the run: write `results.json` when anything was captured,
    /// drop an ephemeral root that stayed empty, and hand back the report.
    pub fn finish(mut self) -> CaptureReport {
        let mut warnings = std::mem::take(&mut self.warnings);
        let root_path = self.config.root.path().to_path_buf();

        let root = if self.failures.is_empty() {
            match &self.config.root {
                CaptureRoot::Ephemeral(path) => {
                    if let Err(err) = std::fs::remove_dir_all(path) {
                        warnings.push(format!("remove ephemeral root {}: {err}", path.display()));
                    }
                    None
                }
                CaptureRoot::Persistent(path) => Some(path.clone()),
            }
        } else {
            if let Err(err) = report::write_results_json(&root_path, &self.failures) {
                warnings.push(format!("results.json: {err:#}"));
            }
            Some(root_path)
        };

        if !warnings.is_empty() {
            warn!(warnings = ?warnings, "capture finished with warnings");
        }

        CaptureReport {
            failures: self.failures,
            slow: report::sorted_by_duration(self.slow),
            root,
            warnings,
        }
    }
}

fn summary_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}

// `set_var` is unsafe under edition 2024 because of concurrent readers; the
// variable is only touched here, between units, from the worker's own
// thread.

#[allow(unsafe_code)]
fn export_capture_dir(dir: &Path) {
    unsafe { std::env::set_var(SUBPROCESS_CAPTURE_ENV, dir) };
}

#[allow(unsafe_code)]
fn remove_capture_dir_export() {
    unsafe { std::env::remove_var(SUBPROCESS_CAPTURE_ENV) };
}
