//! Per-unit capture sessions and phase lifecycle records.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One stage of a unit's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Call,
    Teardown,
}

impl Phase {
    /// Lifecycle order.
    pub const ALL: [Phase; 3] = [Phase::Setup, Phase::Call, Phase::Teardown];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Call => "call",
            Phase::Teardown => "teardown",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Setup => 0,
            Phase::Call => 1,
            Phase::Teardown => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl PhaseOutcome {
    /// Failed and errored phases both make the unit's output worth keeping.
    pub fn is_failure(self) -> bool {
        matches!(self, PhaseOutcome::Failed | PhaseOutcome::Errored)
    }
}

/// Output captured during a single phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseBuffers {
    pub stdout: String,
    pub stderr: String,
}

/// Buffered record for one unit id across its whole lifecycle.
///
/// Created lazily on the unit's first phase hook and evicted by the
/// controller once the unit's aggregate outcome is known.
#[derive(Debug, Default)]
pub struct CaptureSession {
    buffers: [PhaseBuffers; 3],
    outcomes: Vec<(Phase, PhaseOutcome)>,
    errors: Vec<String>,
    call_duration: Option<Duration>,
}

impl CaptureSession {
    pub fn new() -> CaptureSession {
        CaptureSession::default()
    }

    pub fn append_output(&mut self, phase: Phase, stdout: &str, stderr: &str) {
        let buffers = &mut self.buffers[phase.index()];
        buffers.stdout.push_str(stdout);
        buffers.stderr.push_str(stderr);
    }

    /// Record a phase outcome; failing phases may carry an error trace.
    pub fn record_outcome(&mut self, phase: Phase, outcome: PhaseOutcome, error: Option<String>) {
        if outcome.is_failure()
            && let Some(error) = error
        {
            self.errors.push(error);
        }
        self.outcomes.push((phase, outcome));
    }

    pub fn set_call_duration(&mut self, duration: Duration) {
        self.call_duration = Some(duration);
    }

    pub fn call_duration(&self) -> Option<Duration> {
        self.call_duration
    }

    pub fn outcome(&self, phase: Phase) -> Option<PhaseOutcome> {
        self.outcomes
            .iter()
            .find(|(recorded, _)| *recorded == phase)
            .map(|(_, outcome)| *outcome)
    }

    /// A session persists iff at least one phase failed or errored.
    pub fn should_persist(&self) -> bool {
        self.outcomes.iter().any(|(_, outcome)| outcome.is_failure())
    }

    /// Stdout across all phases, in lifecycle order.
    pub fn combined_stdout(&self) -> String {
        Phase::ALL
            .iter()
            .map(|phase| self.buffers[phase.index()].stdout.as_str())
            .collect()
    }

    /// Stderr across all phases, in lifecycle order.
    pub fn combined_stderr(&self) -> String {
        Phase::ALL
            .iter()
            .map(|phase| self.buffers[phase.index()].stderr.as_str())
            .collect()
    }

    /// All error traces joined, one blank line between phases.
    pub fn exception_text(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(self.errors.join("\n\n"))
    }

    /// The first recorded error trace, used for one-line summaries.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persists_only_when_a_phase_failed() {
        let mut session = CaptureSession::new();
        session.record_outcome(Phase::Setup, PhaseOutcome::Passed, None);
        session.record_outcome(Phase::Call, PhaseOutcome::Skipped, None);
        session.record_outcome(Phase::Teardown, PhaseOutcome::Passed, None);
        assert!(!session.should_persist());

        session.record_outcome(Phase::Call, PhaseOutcome::Failed, None);
        assert!(session.should_persist());
    }

    #[test]
    fn errored_counts_as_failure() {
        let mut session = CaptureSession::new();
        session.record_outcome(Phase::Teardown, PhaseOutcome::Errored, Some("boom".into()));
        assert!(session.should_persist());
        assert_eq!(session.exception_text().as_deref(), Some("boom"));
    }

    #[test]
    fn output_concatenates_in_lifecycle_order() {
        let mut session = CaptureSession::new();
        session.append_output(Phase::Teardown, "third", "");
        session.append_output(Phase::Setup, "first", "setup-err");
        session.append_output(Phase::Call, "second", "");

        assert_eq!(session.combined_stdout(), "firstsecondthird");
        assert_eq!(session.combined_stderr(), "setup-err");
    }

    #[test]
    fn errors_join_with_blank_line_between_phases() {
        let mut session = CaptureSession::new();
        session.record_outcome(Phase::Setup, PhaseOutcome::Failed, Some("setup broke".into()));
        session.record_outcome(Phase::Call, PhaseOutcome::Errored, Some("call broke".into()));
        assert_eq!(
            session.exception_text().as_deref(),
            Some("setup broke\n\ncall broke")
        );
        assert_eq!(session.first_error(), Some("setup broke"));
    }

    #[test]
    fn error_text_ignored_for_passing_phases() {
        let mut session = CaptureSession::new();
        session.record_outcome(Phase::Call, PhaseOutcome::Passed, Some("noise".into()));
        assert_eq!(session.exception_text(), None);
    }
}
