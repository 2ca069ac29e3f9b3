//! Harness configuration
//!
//! Settings are read from `CASEKIT_*` environment variables and can be overridden with the `with_*` setters.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const ENV_VERBOSE: &str = "CASEKIT_VERBOSE";
pub const ENV_FILTER: &str = "CASEKIT_FILTER";
pub const ENV_FAIL_FAST: &str = "CASEKIT_FAIL_FAST";
pub const ENV_FORMAT: &str = "CASEKIT_FORMAT";

/// Errors from parsing configuration values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown report format `{0}` (expected console, json or quiet)")]
    UnknownFormat(String),

    #[error("invalid boolean `{value}` for {name}")]
    InvalidBool { name: &'static str, value: String },
}

/// Output format of the harness reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Colored, human-readable lines on stderr
    #[default]
    Console,
    /// One JSON object per event on stdout
    Json,
    /// No output; results are only available from the run report
    Quiet,
}

impl FromStr for ReportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "pretty" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "quiet" | "none" => Ok(ReportFormat::Quiet),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Console => "console",
            ReportFormat::Json => "json",
            ReportFormat::Quiet => "quiet",
        };
        f.write_str(name)
    }
}

/// Harness configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Report every scope (with durations and log lines), not only failures
    pub verbose: bool,
    /// Keyword a scope path must contain to run; other scopes are reported as skipped
    pub filter: Option<String>,
    /// Skip the remaining scopes once any scope has failed
    pub fail_fast: bool,
    /// Reporter output format
    pub format: ReportFormat,
}

impl HarnessConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from the process environment.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_VERBOSE) {
            match parse_bool(ENV_VERBOSE, &value) {
                Ok(verbose) => config.verbose = verbose,
                Err(e) => tracing::warn!("ignoring configuration: {}", e),
            }
        }
        if let Some(value) = lookup(ENV_FAIL_FAST) {
            match parse_bool(ENV_FAIL_FAST, &value) {
                Ok(fail_fast) => config.fail_fast = fail_fast,
                Err(e) => tracing::warn!("ignoring configuration: {}", e),
            }
        }
        if let Some(value) = lookup(ENV_FILTER) {
            let value = value.trim();
            if !value.is_empty() {
                config.filter = Some(value.to_string());
            }
        }
        if let Some(value) = lookup(ENV_FORMAT) {
            match value.parse() {
                Ok(format) => config.format = format,
                Err(e) => tracing::warn!("ignoring configuration: {}", e),
            }
        }

        config
    }

    /// Report every scope, not only failures
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Only run scopes whose path contains `keyword`
    pub fn with_filter(mut self, keyword: impl Into<String>) -> Self {
        self.filter = Some(keyword.into());
        self
    }

    /// Stop starting new scopes after the first failure
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the reporter output format
    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    /// Whether a scope with the given full path is selected by the filter.
    pub fn selects(&self, path: &str) -> bool {
        self.filter.as_deref().is_none_or(|keyword| path.contains(keyword))
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    // ========================================
    // Default config tests
    // ========================================

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert!(!config.verbose);
        assert!(!config.fail_fast);
        assert_eq!(config.filter, None);
        assert_eq!(config.format, ReportFormat::Console);
    }

    #[test]
    fn test_new_equals_default() {
        assert_eq!(HarnessConfig::new(), HarnessConfig::default());
    }

    // ========================================
    // Environment tests
    // ========================================

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            (ENV_VERBOSE, "yes"),
            (ENV_FILTER, " login "),
            (ENV_FAIL_FAST, "1"),
            (ENV_FORMAT, "JSON"),
        ]));
        assert!(config.verbose);
        assert!(config.fail_fast);
        assert_eq!(config.filter.as_deref(), Some("login"));
        assert_eq!(config.format, ReportFormat::Json);
    }

    #[test]
    fn test_from_lookup_ignores_invalid_values() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            (ENV_VERBOSE, "maybe"),
            (ENV_FORMAT, "xml"),
            (ENV_FILTER, "   "),
        ]));
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_report_format_parse_errors() {
        assert_eq!(
            "xml".parse::<ReportFormat>(),
            Err(ConfigError::UnknownFormat("xml".to_string()))
        );
        assert_eq!("quiet".parse::<ReportFormat>(), Ok(ReportFormat::Quiet));
        assert_eq!(ReportFormat::Json.to_string(), "json");
    }

    // ========================================
    // Builder and filter tests
    // ========================================

    #[test]
    fn test_builder_setters() {
        let config = HarnessConfig::new()
            .with_verbose(true)
            .with_filter("cases.rs")
            .with_fail_fast(true)
            .with_format(ReportFormat::Quiet);
        assert!(config.verbose);
        assert!(config.fail_fast);
        assert_eq!(config.filter.as_deref(), Some("cases.rs"));
        assert_eq!(config.format, ReportFormat::Quiet);
    }

    #[test]
    fn test_filter_selection() {
        let config = HarnessConfig::new().with_filter("login");
        assert!(config.selects("suite/login_flow.rs:12"));
        assert!(!config.selects("suite/logout.rs:3"));
        assert!(HarnessConfig::new().selects("anything"));
    }
}
