use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::runner::SubmitTemplate;

/// Ten years.
const MAX_EVICTION_AGE_SECS: u64 = 10 * 365 * 86_400;

/// Top-level bridge configuration.
///
/// Loaded from YAML, then overridden from the environment. Missing fields
/// take their defaults. Durations are whole seconds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub runner: RunnerConfig,
    pub reviewer: ReviewerConfig,
    pub monitor: MonitorConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub log_level: String,
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Runner API settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base URL, e.g. `https://runner.example.com`. Required.
    pub host: String,
    /// Service-account key. Required.
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub template_id: String,
    pub stream_id: String,
    /// Name given to submitted jobs.
    pub job_name: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            api_key: String::new(),
            timeout: 30,
            template_id: String::new(),
            stream_id: String::new(),
            job_name: "preflight".to_string(),
        }
    }
}

/// Reviewer callback settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerConfig {
    /// Per-request timeout in seconds.
    pub timeout: u64,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self { timeout: 30 }
    }
}

/// Reconciliation loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between ticks.
    pub interval: u64,
    /// Records untouched for this many seconds are dropped. 0 disables.
    pub eviction_age: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: 30,
            eviction_age: 86_400,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Grace period for in-flight work on shutdown, in seconds.
    pub shutdown: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { shutdown: 5 }
    }
}

/// Retry policy for Runner calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Seconds.
    pub initial_delay: u64,
    /// Seconds.
    pub max_delay: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: 1,
            max_delay: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid {var} value: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("validating config: {0}")]
    Invalid(String),
}

impl Config {
    /// Read `path`, apply environment overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&raw)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(raw)?;
        if config.log_level.is_empty() {
            config.log_level = "info".to_string();
        }
        Ok(config)
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(v) = lookup("PORT") {
            self.server.port = parse_env("PORT", v)?;
        }
        if let Some(v) = lookup("RUNNER_HOST") {
            self.runner.host = v;
        }
        if let Some(v) = lookup("RUNNER_API_KEY") {
            self.runner.api_key = v;
        }
        if let Some(v) = lookup("RUNNER_TIMEOUT") {
            self.runner.timeout = parse_env("RUNNER_TIMEOUT", v)?;
        }
        if let Some(v) = lookup("REVIEWER_TIMEOUT") {
            self.reviewer.timeout = parse_env("REVIEWER_TIMEOUT", v)?;
        }
        if let Some(v) = lookup("MONITOR_INTERVAL") {
            self.monitor.interval = parse_env("MONITOR_INTERVAL", v)?;
        }
        if let Some(v) = lookup("MONITOR_EVICTION_AGE") {
            self.monitor.eviction_age = parse_env("MONITOR_EVICTION_AGE", v)?;
        }
        if let Some(v) = lookup("TIMEOUT_SHUTDOWN") {
            self.timeouts.shutdown = parse_env("TIMEOUT_SHUTDOWN", v)?;
        }
        if let Some(v) = lookup("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("RETRY_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("RETRY_INITIAL_DELAY") {
            self.retry.initial_delay = parse_env("RETRY_INITIAL_DELAY", v)?;
        }
        if let Some(v) = lookup("RETRY_MAX_DELAY") {
            self.retry.max_delay = parse_env("RETRY_MAX_DELAY", v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.host.is_empty() {
            return Err(ConfigError::Invalid("runner host is required".into()));
        }
        if self.runner.api_key.is_empty() {
            return Err(ConfigError::Invalid("runner API key is required".into()));
        }
        if self.server.port == 0 || self.server.port > 65_535 {
            return Err(ConfigError::Invalid(format!(
                "invalid port number: {}",
                self.server.port
            )));
        }
        if self.monitor.interval == 0 {
            return Err(ConfigError::Invalid("monitor interval must be at least 1s".into()));
        }
        if self.monitor.eviction_age > MAX_EVICTION_AGE_SECS {
            return Err(ConfigError::Invalid(format!(
                "monitor eviction_age must not exceed {MAX_EVICTION_AGE_SECS}s"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry max_attempts must be at least 1".into()));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(ConfigError::Invalid(
                "retry max_delay must not be below initial_delay".into(),
            ));
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        u16::try_from(self.server.port).unwrap_or(8080)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval)
    }

    /// `None` when the age-based safety net is disabled.
    pub fn eviction_age(&self) -> Option<chrono::Duration> {
        match self.monitor.eviction_age {
            0 => None,
            secs => Some(chrono::Duration::seconds(
                i64::try_from(secs.min(MAX_EVICTION_AGE_SECS)).unwrap_or(0),
            )),
        }
    }

    pub fn runner_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.timeout)
    }

    pub fn reviewer_timeout(&self) -> Duration {
        Duration::from_secs(self.reviewer.timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.shutdown)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.initial_delay),
            Duration::from_secs(self.retry.max_delay),
        )
    }

    pub fn submit_template(&self) -> SubmitTemplate {
        SubmitTemplate {
            stream_id: self.runner.stream_id.clone(),
            template_id: self.runner.template_id.clone(),
            name: self.runner.job_name.clone(),
        }
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
server:
  port: 8080

runner:
  host: "http://runner.example.com"
  api_key: "test-key"
  timeout: 30
  template_id: "tpl"
  stream_id: "main"

reviewer:
  timeout: 20

monitor:
  interval: 15
  eviction_age: 3600

timeouts:
  shutdown: 5

retry:
  max_attempts: 4
  initial_delay: 2
  max_delay: 10

log_level: "debug"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_full_file() {
        let cfg = Config::from_yaml_str(FULL).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.runner.host, "http://runner.example.com");
        assert_eq!(cfg.runner.api_key, "test-key");
        assert_eq!(cfg.monitor_interval(), Duration::from_secs(15));
        assert_eq!(cfg.eviction_age(), Some(chrono::Duration::seconds(3600)));
        assert_eq!(cfg.reviewer_timeout(), Duration::from_secs(20));
        assert_eq!(
            cfg.retry_policy(),
            RetryPolicy::new(4, Duration::from_secs(2), Duration::from_secs(10))
        );
        assert_eq!(cfg.log_level, "debug");
        cfg.validate().unwrap();
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = Config::from_yaml_str("runner:\n  host: h\n  api_key: k\n").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.runner.timeout, 30);
        assert_eq!(cfg.runner.job_name, "preflight");
        assert_eq!(cfg.reviewer.timeout, 30);
        assert_eq!(cfg.monitor.interval, 30);
        assert_eq!(cfg.monitor.eviction_age, 86_400);
        assert_eq!(cfg.timeouts.shutdown, 5);
        assert_eq!(cfg.retry, RetryConfig::default());
        assert_eq!(cfg.log_level, "info");
        cfg.validate().unwrap();
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::from_yaml_str(FULL).unwrap();
        cfg.apply_env_overrides(env(&[
            ("PORT", "9090"),
            ("RUNNER_API_KEY", "env-key"),
            ("LOG_LEVEL", "warn"),
            ("RETRY_MAX_ATTEMPTS", "7"),
            ("MONITOR_EVICTION_AGE", "0"),
        ]))
        .unwrap();

        assert_eq!(cfg.port(), 9090);
        assert_eq!(cfg.runner.api_key, "env-key");
        assert_eq!(cfg.log_level, "warn");
        assert_eq!(cfg.retry.max_attempts, 7);
        assert_eq!(cfg.eviction_age(), None);
    }

    #[test]
    fn invalid_env_number_names_the_variable() {
        let mut cfg = Config::from_yaml_str(FULL).unwrap();
        let err = cfg
            .apply_env_overrides(env(&[("PORT", "invalid")]))
            .unwrap_err();
        assert!(err.to_string().contains("invalid PORT value"));

        let err = cfg
            .apply_env_overrides(env(&[("MONITOR_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("invalid MONITOR_INTERVAL value"));
    }

    #[test]
    fn missing_required_fields() {
        let cfg = Config::from_yaml_str("server:\n  port: 8080\n").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("runner host is required"));

        let cfg = Config::from_yaml_str("runner:\n  host: h\n").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("runner API key is required"));
    }

    #[test]
    fn invalid_port() {
        let cfg = Config::from_yaml_str("server:\n  port: 70000\nrunner:\n  host: h\n  api_key: k\n")
            .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid port number"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load("does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("reading config file"));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = Config::from_yaml_str("server: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
