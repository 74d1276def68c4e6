//! Workflow configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default run timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

fn default_timeout_secs() -> Option<f64> {
    Some(DEFAULT_TIMEOUT_SECS)
}

/// Settings of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Time budget of one run in seconds; `None` disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<f64>,
    /// Log every step outcome at INFO.
    #[serde(default)]
    pub verbose: bool,
    /// Skip definition checks at the start of each run.
    #[serde(default)]
    pub disable_validation: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            verbose: false,
            disable_validation: false,
        }
    }
}

impl WorkflowConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from `EVENTFLOW_TIMEOUT_SECS`, `EVENTFLOW_VERBOSE` and
    /// `EVENTFLOW_DISABLE_VALIDATION`.
    ///
    /// A timeout of `0` or `none` disables the timeout. Unparseable values
    /// keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("EVENTFLOW_TIMEOUT_SECS") {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("none") {
                config.timeout_secs = None;
            } else if let Ok(secs) = raw.parse::<f64>() {
                config.timeout_secs = (secs > 0.0).then_some(secs);
            }
        }
        if let Some(flag) = lookup("EVENTFLOW_VERBOSE").as_deref().and_then(parse_flag) {
            config.verbose = flag;
        }
        if let Some(flag) = lookup("EVENTFLOW_DISABLE_VALIDATION")
            .as_deref()
            .and_then(parse_flag)
        {
            config.disable_validation = flag;
        }
        config
    }

    /// Sets the run timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map(|t| t.as_secs_f64());
        self
    }

    /// Sets verbose logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Disables or enables validation.
    #[must_use]
    pub fn with_disable_validation(mut self, disable: bool) -> Self {
        self.disable_validation = disable;
        self
    }

    /// Returns the run timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.timeout(), Some(Duration::from_secs(10)));
        assert!(!config.verbose);
        assert!(!config.disable_validation);
    }

    #[test]
    fn test_builders() {
        let config = WorkflowConfig::new()
            .with_timeout(Some(Duration::from_millis(1500)))
            .with_verbose(true)
            .with_disable_validation(true);

        assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
        assert!(config.verbose);
        assert!(config.disable_validation);
        assert_eq!(WorkflowConfig::new().with_timeout(None).timeout(), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: WorkflowConfig = serde_json::from_str(r#"{"verbose": true}"#).unwrap();
        assert_eq!(config.timeout_secs, Some(DEFAULT_TIMEOUT_SECS));
        assert!(config.verbose);

        let config: WorkflowConfig = serde_json::from_str(r#"{"timeout_secs": null}"#).unwrap();
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("EVENTFLOW_TIMEOUT_SECS", "2.5"),
            ("EVENTFLOW_VERBOSE", "yes"),
            ("EVENTFLOW_DISABLE_VALIDATION", "maybe"),
        ]
        .into_iter()
        .collect();
        let config = WorkflowConfig::from_lookup(|k| env.get(k).map(ToString::to_string));

        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert!(config.verbose);
        assert!(!config.disable_validation);
    }

    #[test]
    fn test_from_lookup_disables_timeout() {
        let config = WorkflowConfig::from_lookup(|k| {
            (k == "EVENTFLOW_TIMEOUT_SECS").then(|| "none".to_string())
        });
        assert_eq!(config.timeout(), None);

        let config = WorkflowConfig::from_lookup(|k| {
            (k == "EVENTFLOW_TIMEOUT_SECS").then(|| "0".to_string())
        });
        assert_eq!(config.timeout(), None);
    }
}
