//! Artifact persistence for failed units.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use super::session::CaptureSession;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("ansi escape pattern"));

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Map a unit id to a filesystem-safe directory name.
///
/// Path separators become `__`; anything outside `[A-Za-z0-9._-]` (the `[`,
/// `]`, `/`, spaces of parametrized ids) becomes `-`.
pub fn sanitize_unit_id(unit_id: &str) -> String {
    unit_id
        .replace("::", "__")
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

pub fn artifact_dir(root: &Path, unit_id: &str) -> PathBuf {
    root.join(sanitize_unit_id(unit_id))
}

/// Outcome of one persistence attempt. Write failures are collected as
/// warnings so a full disk never turns into a suite failure.
#[derive(Debug)]
pub struct WrittenArtifacts {
    pub dir: PathBuf,
    pub files: Vec<&'static str>,
    pub warnings: Vec<String>,
}

/// Write the non-empty buffers of a failed unit under `root`.
///
/// Only files with content are created; a failure with no output and no
/// trace creates nothing at all.
pub fn write_artifacts(root: &Path, unit_id: &str, session: &CaptureSession) -> WrittenArtifacts {
    let dir = artifact_dir(root, unit_id);
    let mut written = WrittenArtifacts {
        dir: dir.clone(),
        files: Vec::new(),
        warnings: Vec::new(),
    };

    let entries = [
        ("stdout.txt", session.combined_stdout()),
        ("stderr.txt", session.combined_stderr()),
        ("exception.txt", session.exception_text().unwrap_or_default()),
    ];

    let mut dir_ready = false;
    for (name, contents) in entries {
        if contents.is_empty() {
            continue;
        }
        if !dir_ready {
            if let Err(err) = fs::create_dir_all(&dir) {
                written
                    .warnings
                    .push(format!("create {}: {err}", dir.display()));
                return written;
            }
            dir_ready = true;
        }
        let path = dir.join(name);
        match fs::write(&path, strip_ansi(&contents)) {
            Ok(()) => written.files.push(name),
            Err(err) => written
                .warnings
                .push(format!("write {}: {err}", path.display())),
        }
    }

    written
}

/// Remove stale files from a previous run of the same unit.
pub fn clean_artifact_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::session::{Phase, PhaseOutcome};
    use tempfile::tempdir;

    #[test]
    fn sanitizes_module_paths_and_parametrized_ids() {
        assert_eq!(
            sanitize_unit_id("tests::auth::login"),
            "tests__auth__login"
        );
        assert_eq!(
            sanitize_unit_id("tests::parse::case[utf8/empty]"),
            "tests__parse__case-utf8-empty-"
        );
        assert_eq!(sanitize_unit_id("plain_name-1.2"), "plain_name-1.2");
    }

    #[test]
    fn writes_only_non_empty_buffers() {
        let temp = tempdir().expect("tempdir");
        let mut session = CaptureSession::new();
        session.append_output(Phase::Call, "hello", "");
        session.record_outcome(Phase::Call, PhaseOutcome::Failed, Some("trace".into()));

        let written = write_artifacts(temp.path(), "unit::one", &session);
        assert!(written.warnings.is_empty());
        assert_eq!(written.files, vec!["stdout.txt", "exception.txt"]);
        assert!(written.dir.join("stdout.txt").exists());
        assert!(!written.dir.join("stderr.txt").exists());
    }

    #[test]
    fn creates_nothing_for_an_empty_session() {
        let temp = tempdir().expect("tempdir");
        let session = CaptureSession::new();
        let written = write_artifacts(temp.path(), "unit::empty", &session);
        assert!(written.files.is_empty());
        assert!(!written.dir.exists());
    }

    #[test]
    fn strips_ansi_escapes_from_written_files() {
        let temp = tempdir().expect("tempdir");
        let mut session = CaptureSession::new();
        session.append_output(Phase::Call, "\x1b[31mred\x1b[0m plain", "");
        session.record_outcome(Phase::Call, PhaseOutcome::Failed, None);

        let written = write_artifacts(temp.path(), "unit::ansi", &session);
        let stdout = fs::read_to_string(written.dir.join("stdout.txt")).expect("read stdout");
        assert_eq!(stdout, "red plain");
    }

    #[test]
    fn unwritable_root_degrades_to_a_warning() {
        let temp = tempdir().expect("tempdir");
        let blocked = temp.path().join("blocked");
        fs::write(&blocked, "a file where a directory should go").expect("block root");

        let mut session = CaptureSession::new();
        session.append_output(Phase::Call, "output", "");
        session.record_outcome(Phase::Call, PhaseOutcome::Failed, None);

        let written = write_artifacts(&blocked, "unit::blocked", &session);
        assert!(written.files.is_empty());
        assert_eq!(written.warnings.len(), 1);
    }

    #[test]
    fn clean_removes_stale_entries_but_keeps_dir() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("unit__stale");
        fs::create_dir_all(dir.join("nested")).expect("nested");
        fs::write(dir.join("stdout.txt"), "old").expect("stale file");

        clean_artifact_dir(&dir).expect("clean");
        assert!(dir.exists());
        assert_eq!(fs::read_dir(&dir).expect("read").count(), 0);
    }
}
