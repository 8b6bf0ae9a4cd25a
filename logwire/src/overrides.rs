//! Per-target log level and destination overrides from the environment.
//!
//! Variables follow a fixed prefix + uppercased target convention:
//!
//! ```text
//! LOG_LEVEL_HYPER=debug            # hyper logs at debug
//! LOG_PATH_HYPER=/var/log/hyper.log
//! LOG_LEVEL_HYPER__PROTO=trace     # `__` separates module path segments
//! ```
//!
//! Malformed values are reported once at startup and ignored; the rest of
//! the override still applies.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::warn;

use crate::levels::{self, LogLevel};

/// Prefix for per-target level variables.
pub const LEVEL_PREFIX: &str = "LOG_LEVEL_";
/// Prefix for per-target destination variables.
pub const PATH_PREFIX: &str = "LOG_PATH_";

/// Level and/or destination override for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOverride {
    pub level: Option<LogLevel>,
    pub path: Option<PathBuf>,
}

/// Parse overrides from the process environment.
pub fn from_env() -> BTreeMap<String, TargetOverride> {
    from_vars(std::env::vars())
}

/// Parse overrides from `(key, value)` pairs.
///
/// Split out from [`from_env`] so tests never mutate the process
/// environment.
pub fn from_vars(
    vars: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, TargetOverride> {
    let mut overrides: BTreeMap<String, TargetOverride> = BTreeMap::new();

    for (key, value) in vars {
        if let Some(name) = key.strip_prefix(LEVEL_PREFIX) {
            let Some(target) = normalize_target(name, &key) else {
                continue;
            };
            if let Some(level) = levels::parse_lenient(&value, &key) {
                overrides.entry(target).or_default().level = Some(level);
            }
        } else if let Some(name) = key.strip_prefix(PATH_PREFIX) {
            let Some(target) = normalize_target(name, &key) else {
                continue;
            };
            if value.trim().is_empty() {
                warn!(key = %key, "empty log path override, ignoring");
                continue;
            }
            overrides.entry(target).or_default().path = Some(PathBuf::from(value));
        }
    }

    overrides
}

/// Lowercase the uppercased env suffix back into a target name; `__` maps to
/// the module-path separator. Single underscores are kept since they are
/// legitimate in crate and module names.
fn normalize_target(name: &str, key: &str) -> Option<String> {
    if name.is_empty() {
        warn!(key = %key, "override variable has no target name, ignoring");
        return None;
    }
    Some(name.to_ascii_lowercase().replace("__", "::"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parses_level_and_path_for_one_target() {
        let parsed = from_vars(vars(&[
            ("LOG_LEVEL_HYPER", "debug"),
            ("LOG_PATH_HYPER", "/var/log/hyper.log"),
        ]));

        assert_eq!(
            parsed.get("hyper"),
            Some(&TargetOverride {
                level: Some(LogLevel::Debug),
                path: Some(PathBuf::from("/var/log/hyper.log")),
            })
        );
    }

    #[test]
    fn double_underscore_becomes_module_separator() {
        let parsed = from_vars(vars(&[("LOG_LEVEL_HYPER__PROTO", "trace")]));
        assert_eq!(parsed.get("hyper::proto").unwrap().level, Some(LogLevel::Trace));
    }

    #[test]
    fn single_underscore_is_preserved() {
        let parsed = from_vars(vars(&[("LOG_LEVEL_MY_CRATE", "warn")]));
        assert_eq!(parsed.get("my_crate").unwrap().level, Some(LogLevel::Warn));
    }

    #[test]
    fn malformed_level_keeps_the_path_half() {
        let parsed = from_vars(vars(&[
            ("LOG_LEVEL_HYPER", "loud"),
            ("LOG_PATH_HYPER", "/var/log/hyper.log"),
        ]));

        let hyper = parsed.get("hyper").unwrap();
        assert_eq!(hyper.level, None);
        assert_eq!(hyper.path, Some(PathBuf::from("/var/log/hyper.log")));
    }

    #[test]
    fn ignores_unrelated_and_degenerate_keys() {
        let parsed = from_vars(vars(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_LEVEL_", "debug"),
            ("LOG_PATH_HYPER", "  "),
            ("HOME", "/root"),
        ]));
        assert!(parsed.is_empty());
    }
}
