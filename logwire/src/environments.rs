//! Deployment environment detection from `APP_ENV`.

/// Environment variable naming the deployment environment.
pub const APP_ENV: &str = "APP_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    /// Detect the environment from `APP_ENV`, defaulting to development.
    pub fn detect() -> Self {
        Self::from_value(std::env::var(APP_ENV).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("production") => Environment::Production,
            Some("staging") => Environment::Staging,
            Some("test") => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn is_staging(self) -> bool {
        self == Environment::Staging
    }

    pub fn is_test(self) -> bool {
        self == Environment::Test
    }

    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    /// Deployed environments emit JSON lines; everything else gets the
    /// human console format.
    pub fn json_by_default(self) -> bool {
        matches!(self, Environment::Production | Environment::Staging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_environments() {
        assert_eq!(
            Environment::from_value(Some("production")),
            Environment::Production
        );
        assert_eq!(
            Environment::from_value(Some(" Staging ")),
            Environment::Staging
        );
        assert_eq!(Environment::from_value(Some("TEST")), Environment::Test);
    }

    #[test]
    fn defaults_to_development() {
        assert_eq!(Environment::from_value(None), Environment::Development);
        assert_eq!(
            Environment::from_value(Some("qa")),
            Environment::Development
        );
        assert_eq!(Environment::from_value(Some("")), Environment::Development);
    }

    #[test]
    fn json_defaults_on_for_deployed_environments() {
        assert!(Environment::Production.json_by_default());
        assert!(Environment::Staging.json_by_default());
        assert!(!Environment::Development.json_by_default());
        assert!(!Environment::Test.json_by_default());
    }
}
