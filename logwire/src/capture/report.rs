//! End-of-run reporting: terminal summary and `results.json`.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One failed unit whose output was captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturedFailure {
    pub unit_id: String,
    pub artifact_dir: PathBuf,
    /// One-line error summary from the first failing phase.
    pub error_summary: Option<String>,
    /// Call-phase duration, when the call phase ran.
    pub duration_secs: Option<f64>,
}

/// A passing unit slower than the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlowUnit {
    pub unit_id: String,
    pub duration_secs: f64,
}

#[derive(Debug, Serialize)]
struct ResultsFile<'a> {
    generated_at: String,
    failures: &'a [CapturedFailure],
}

/// Write the machine-readable failure index to `<root>/results.json`.
pub fn write_results_json(root: &Path, failures: &[CapturedFailure]) -> Result<PathBuf> {
    let path = root.join("results.json");
    let payload = ResultsFile {
        generated_at: Utc::now().to_rfc3339(),
        failures,
    };
    let mut contents = serde_json::to_string_pretty(&payload).context("serialize results")?;
    contents.push('\n');
    fs::write(&path, contents).with_context(|| format!("write results {}", path.display()))?;
    Ok(path)
}

pub(crate) fn sorted_by_duration(mut slow: Vec<SlowUnit>) -> Vec<SlowUnit> {
    slow.sort_by(|a, b| {
        b.duration_secs
            .partial_cmp(&a.duration_secs)
            .unwrap_or(Ordering::Equal)
    });
    slow
}

/// Everything the harness needs to print once the suite finishes.
#[derive(Debug)]
pub struct CaptureReport {
    pub failures: Vec<CapturedFailure>,
    /// Slow passing units, slowest first.
    pub slow: Vec<SlowUnit>,
    /// Output root holding the artifacts; `None` when an ephemeral root was
    /// discarded because nothing was captured.
    pub root: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl CaptureReport {
    /// Human summary block for the harness's terminal output.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.failures.is_empty() {
            out.push_str("==== captured output ====\n");
            for failure in &self.failures {
                let duration = failure
                    .duration_secs
                    .map(|secs| format!(" {secs:.2}s"))
                    .unwrap_or_default();
                out.push_str(&format!("[failed]{duration} {}\n", failure.unit_id));
                out.push_str(&format!("  logs: {}/\n", failure.artifact_dir.display()));
                if let Some(summary) = &failure.error_summary {
                    out.push_str(&format!("  {summary}\n"));
                }
                out.push('\n');
            }
        }

        if !self.slow.is_empty() {
            out.push_str("==== slow units ====\n");
            for unit in &self.slow {
                out.push_str(&format!("[slow] {:.2}s {}\n", unit.duration_secs, unit.unit_id));
            }
        }

        if !self.warnings.is_empty() {
            out.push_str("==== capture warnings ====\n");
            for warning in &self.warnings {
                out.push_str(&format!("[warn] {warning}\n"));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn failure(unit_id: &str) -> CapturedFailure {
        CapturedFailure {
            unit_id: unit_id.to_string(),
            artifact_dir: PathBuf::from("/tmp/out").join(unit_id),
            error_summary: Some("assertion failed: boom".to_string()),
            duration_secs: Some(0.25),
        }
    }

    #[test]
    fn results_json_round_trips() {
        let temp = tempdir().expect("tempdir");
        let failures = vec![failure("unit__a")];
        let path = write_results_json(temp.path(), &failures).expect("write");

        let raw = fs::read_to_string(path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        assert!(value["generated_at"].is_string());
        assert_eq!(value["failures"][0]["unit_id"], "unit__a");
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn render_lists_failures_with_artifact_paths() {
        let report = CaptureReport {
            failures: vec![failure("tests__auth__login")],
            slow: Vec::new(),
            root: Some(PathBuf::from("/tmp/out")),
            warnings: Vec::new(),
        };

        let rendered = report.render();
        assert!(rendered.contains("[failed] 0.25s tests__auth__login"));
        assert!(rendered.contains("logs: /tmp/out/tests__auth__login/"));
        assert!(rendered.contains("assertion failed: boom"));
    }

    #[test]
    fn render_is_empty_for_a_green_quiet_run() {
        let report = CaptureReport {
            failures: Vec::new(),
            slow: Vec::new(),
            root: None,
            warnings: Vec::new(),
        };
        assert_eq!(report.render(), "");
    }

    #[test]
    fn slow_units_sort_slowest_first() {
        let slow = sorted_by_duration(vec![
            SlowUnit {
                unit_id: "a".into(),
                duration_secs: 1.5,
            },
            SlowUnit {
                unit_id: "b".into(),
                duration_secs: 4.0,
            },
        ]);
        assert_eq!(slow[0].unit_id, "b");
    }
}
