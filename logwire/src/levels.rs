//! Log level registry with a custom finest tier.
//!
//! `Trace` sits numerically below `Debug`, mirroring the severity table used
//! across our services. Names parse case-insensitively and bare numeric
//! severities are accepted, so `LOG_LEVEL=10` and `LOG_LEVEL=debug` agree.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;

/// Environment variable naming the global minimum level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Severity tiers, finest first. Ordering follows declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Numeric severity used for comparisons and numeric env values.
    pub fn severity(self) -> u8 {
        match self {
            LogLevel::Trace => 5,
            LogLevel::Debug => 10,
            LogLevel::Info => 20,
            LogLevel::Warn => 30,
            LogLevel::Error => 40,
        }
    }

    /// Lowercase directive form accepted by the subscriber's env filter.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Backend filter for this tier.
    ///
    /// The backend has no tier below its own finest, so our custom trace tier
    /// folds onto it; the distinct severity only matters for comparisons.
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }

    /// True when this tier is at or below the debug tier.
    pub fn is_debug(self) -> bool {
        self <= LogLevel::Debug
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => from_severity(other).ok_or_else(|| anyhow!("unrecognized log level {s:?}")),
        }
    }
}

fn from_severity(raw: &str) -> Option<LogLevel> {
    let severity: u8 = raw.parse().ok()?;
    [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ]
    .into_iter()
    .find(|level| level.severity() == severity)
}

/// Compare two level names, erroring on unrecognized input.
///
/// `compare_levels("DEBUG", "INFO")` is `Ordering::Less`: debug is finer.
pub fn compare_levels(left: &str, right: &str) -> Result<Ordering> {
    let left: LogLevel = left.parse()?;
    let right: LogLevel = right.parse()?;
    Ok(left.severity().cmp(&right.severity()))
}

/// Parse a level value, warning (once per call site concern) and yielding
/// `None` on malformed input so callers fall back to their default.
pub(crate) fn parse_lenient(raw: &str, origin: &str) -> Option<LogLevel> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(level) => Some(level),
        Err(_) => {
            warn!(origin, value = raw, "unrecognized log level, ignoring");
            None
        }
    }
}

/// Resolve the global minimum level from `LOG_LEVEL`.
///
/// Unset, blank, and malformed values all resolve to `Info`.
pub fn environment_level() -> LogLevel {
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|raw| parse_lenient(&raw, LOG_LEVEL_ENV))
        .unwrap_or_default()
}

/// True when the configured global minimum is at or below the debug tier.
///
/// Useful for flipping third-party debug flags from one `LOG_LEVEL` knob.
/// Before [`crate::config::init`] has run there is no configured minimum, so
/// the check falls back to the environment value.
pub fn is_debug_level() -> bool {
    match crate::config::active_level() {
        Some(level) => level.is_debug(),
        None => {
            warn!("logging not initialized; resolving debug check from LOG_LEVEL");
            environment_level().is_debug()
        }
    }
}
