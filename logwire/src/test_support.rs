//! Test-only helpers for constructing capture configs and sessions.

use std::path::Path;

use crate::capture::{CaptureConfig, CaptureRoot, CaptureSession, Phase, PhaseOutcome};

/// Persistent-root config with fd capture and slow reporting off.
pub fn persistent_config(root: &Path) -> CaptureConfig {
    CaptureConfig {
        root: CaptureRoot::Persistent(root.to_path_buf()),
        fd_capture: false,
        slow_threshold: None,
    }
}

/// Session whose call phase failed with the given output and trace.
pub fn failed_call_session(stdout: &str, error: &str) -> CaptureSession {
    let mut session = CaptureSession::new();
    session.record_outcome(Phase::Setup, PhaseOutcome::Passed, None);
    session.append_output(Phase::Call, stdout, "");
    session.record_outcome(Phase::Call, PhaseOutcome::Failed, Some(error.to_string()));
    session.record_outcome(Phase::Teardown, PhaseOutcome::Passed, None);
    session
}

/// Session where every phase passed.
pub fn passing_session() -> CaptureSession {
    let mut session = CaptureSession::new();
    for phase in Phase::ALL {
        session.record_outcome(phase, PhaseOutcome::Passed, None);
    }
    session
}
