//! Global logging wiring: one process, one subscriber, stable handle.

use std::fs;

use logwire::config::{self, JsonMode, LogConfig};
use logwire::levels::{self, LogLevel};

/// The process-global pieces have to be exercised in one test: the first
/// `init` wins, later calls return the same handle, and level queries
/// follow the installed configuration.
#[test]
fn init_installs_once_and_level_queries_follow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log_path = temp.path().join("logs/app.log");

    let handle = config::init(&LogConfig {
        level: Some(LogLevel::Trace),
        json: JsonMode::Disabled,
        path: Some(log_path.clone()),
    });
    assert_eq!(handle.level, LogLevel::Trace);
    assert!(!handle.json);
    assert_eq!(config::active_level(), Some(LogLevel::Trace));
    assert!(levels::is_debug_level(), "trace sits below the debug tier");

    // A second init must not reconfigure or duplicate layers.
    let again = config::init(&LogConfig {
        level: Some(LogLevel::Error),
        json: JsonMode::Enabled,
        path: None,
    });
    assert!(std::ptr::eq(handle, again));
    assert_eq!(config::active_level(), Some(LogLevel::Trace));

    // The main layer writes to the configured destination, and only once.
    tracing::error!("wired to a file destination");
    let contents = fs::read_to_string(&log_path).expect("read log file");
    assert_eq!(
        contents.matches("wired to a file destination").count(),
        1,
        "duplicate layers would repeat the line"
    );
}
