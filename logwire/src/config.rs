//! Process-wide logging configuration.
//!
//! [`init`] wires the global `tracing` subscriber once per process: a main
//! format layer (JSON lines in deployed environments, console format
//! elsewhere) plus one file layer per path-overridden target. The subscriber
//! registry is inherently process-global, so the handle lives in a once cell
//! and repeated calls return it without stacking duplicate layers.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing::warn;
use tracing_subscriber::filter::{Directive, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::capture;
use crate::environments::Environment;
use crate::levels::{self, LogLevel};
use crate::overrides::{self, TargetOverride};

/// Environment variable routing the main layer to a file instead of stdout.
pub const LOG_PATH_ENV: &str = "LOG_PATH";
/// Environment variable forcing JSON output on or off.
pub const LOG_JSON_ENV: &str = "LOG_JSON";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonMode {
    /// JSON in production/staging, console otherwise.
    #[default]
    Auto,
    Enabled,
    Disabled,
}

/// Configuration accepted by [`init`]. Unset fields resolve from the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Global minimum level; defaults to `LOG_LEVEL`, then `INFO`.
    pub level: Option<LogLevel>,
    pub json: JsonMode,
    /// Main layer destination; defaults to `LOG_PATH`, then stdout.
    pub path: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let level = std::env::var(levels::LOG_LEVEL_ENV)
            .ok()
            .and_then(|raw| levels::parse_lenient(&raw, levels::LOG_LEVEL_ENV));
        let json = std::env::var(LOG_JSON_ENV)
            .ok()
            .map(|raw| json_mode(&raw))
            .unwrap_or_default();
        let path = std::env::var(LOG_PATH_ENV)
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);
        Self { level, json, path }
    }
}

/// Resolved state of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingHandle {
    pub level: LogLevel,
    pub json: bool,
}

static HANDLE: OnceCell<LoggingHandle> = OnceCell::new();

/// Minimum level of the installed subscriber, if [`init`] has run.
pub fn active_level() -> Option<LogLevel> {
    HANDLE.get().map(|handle| handle.level)
}

/// Install the global subscriber. Idempotent: later calls return the handle
/// from the first, so it is safe to call from test setup repeatedly.
pub fn init(config: &LogConfig) -> &'static LoggingHandle {
    HANDLE.get_or_init(|| install(config))
}

/// Resolve everything from the environment and install.
pub fn init_from_env() -> &'static LoggingHandle {
    init(&LogConfig::from_env())
}

fn install(config: &LogConfig) -> LoggingHandle {
    let level = config.level.unwrap_or_else(levels::environment_level);
    let json = match config.json {
        JsonMode::Enabled => true,
        JsonMode::Disabled => false,
        JsonMode::Auto => Environment::detect().json_by_default(),
    };
    let overrides = overrides::from_env();

    // Open per-target files first: a target only leaves the main layer once
    // its file destination is known good.
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut routed_to_file = Vec::new();
    for (target, entry) in &overrides {
        let Some(path) = &entry.path else { continue };
        match file_layer(target, path, entry.level.unwrap_or(level)) {
            Ok(layer) => {
                layers.push(layer);
                routed_to_file.push(target.clone());
            }
            Err(err) => {
                warn!(target = %target, path = %path.display(), "per-target log file disabled: {err:#}");
            }
        }
    }

    let filter = build_env_filter(level, &overrides, &routed_to_file);
    layers.insert(0, main_layer(json, config.path.as_deref(), filter));

    // Never panic if something else already installed a subscriber.
    let _ = tracing_subscriber::registry().with(layers).try_init();

    LoggingHandle { level, json }
}

/// Directives layered on top of the base level: `target=level` for plain
/// level overrides, `target=off` for targets routed to their own file.
fn override_directives(
    overrides: &BTreeMap<String, TargetOverride>,
    routed_to_file: &[String],
) -> Vec<String> {
    overrides
        .iter()
        .filter_map(|(target, entry)| {
            if routed_to_file.iter().any(|routed| routed == target) {
                Some(format!("{target}=off"))
            } else {
                entry
                    .level
                    .map(|level| format!("{target}={}", level.as_directive()))
            }
        })
        .collect()
}

fn build_env_filter(
    level: LogLevel,
    overrides: &BTreeMap<String, TargetOverride>,
    routed_to_file: &[String],
) -> EnvFilter {
    // RUST_LOG keeps full directive syntax when present; the configured
    // level is only the fallback base.
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
    for directive in override_directives(overrides, routed_to_file) {
        match directive.parse::<Directive>() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(err) => warn!(directive = %directive, "skipping invalid filter directive: {err}"),
        }
    }
    filter
}

fn main_layer(json: bool, path: Option<&Path>, filter: EnvFilter) -> BoxedLayer {
    let file = path.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(Arc::new(file)),
        Err(err) => {
            warn!(path = %path.display(), "log file unavailable, writing to stdout: {err:#}");
            None
        }
    });

    match (json, file) {
        (true, Some(file)) => fmt::layer()
            .json()
            .with_writer(file)
            .with_filter(filter)
            .boxed(),
        (true, None) => fmt::layer()
            .json()
            .with_writer(capture::stdout_writer)
            .with_filter(filter)
            .boxed(),
        (false, Some(file)) => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(file)
            .with_filter(filter)
            .boxed(),
        (false, None) => fmt::layer()
            .compact()
            .with_writer(capture::stdout_writer)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(target: &str, path: &Path, level: LogLevel) -> Result<BoxedLayer> {
    let file = open_log_file(path)?;
    let targets = Targets::new().with_target(target, level.as_filter());
    Ok(fmt::layer()
        .compact()
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .with_filter(targets)
        .boxed())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

fn json_mode(raw: &str) -> JsonMode {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => JsonMode::Enabled,
        "0" | "false" | "no" | "off" => JsonMode::Disabled,
        "" => JsonMode::Auto,
        _ => {
            warn!(value = raw, "unrecognized LOG_JSON value, auto-detecting");
            JsonMode::Auto
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::LogLevel;

    fn overrides_fixture() -> BTreeMap<String, TargetOverride> {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "hyper".to_string(),
            TargetOverride {
                level: Some(LogLevel::Debug),
                path: None,
            },
        );
        overrides.insert(
            "sqlx".to_string(),
            TargetOverride {
                level: Some(LogLevel::Trace),
                path: Some(PathBuf::from("/var/log/sqlx.log")),
            },
        );
        overrides
    }

    #[test]
    fn level_override_becomes_directive() {
        let directives = override_directives(&overrides_fixture(), &[]);
        assert!(directives.contains(&"hyper=debug".to_string()));
        // File layer never opened, so the target stays on the main layer at
        // its requested level.
        assert!(directives.contains(&"sqlx=trace".to_string()));
    }

    #[test]
    fn file_routed_target_is_silenced_on_main_layer() {
        let directives = override_directives(&overrides_fixture(), &["sqlx".to_string()]);
        assert!(directives.contains(&"hyper=debug".to_string()));
        assert!(directives.contains(&"sqlx=off".to_string()));
    }

    #[test]
    fn json_mode_parses_common_spellings() {
        assert_eq!(json_mode("1"), JsonMode::Enabled);
        assert_eq!(json_mode("TRUE"), JsonMode::Enabled);
        assert_eq!(json_mode("off"), JsonMode::Disabled);
        assert_eq!(json_mode(""), JsonMode::Auto);
        assert_eq!(json_mode("sometimes"), JsonMode::Auto);
    }

    #[test]
    fn init_is_idempotent() {
        let config = LogConfig {
            level: Some(LogLevel::Debug),
            json: JsonMode::Disabled,
            path: None,
        };
        let first = init(&config);
        let second = init(&LogConfig {
            level: Some(LogLevel::Error),
            json: JsonMode::Enabled,
            path: None,
        });
        assert!(std::ptr::eq(first, second));
        assert_eq!(active_level(), Some(first.level));
    }
}
