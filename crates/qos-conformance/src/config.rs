//! Harness configuration.
//!
//! [`HarnessConfig`] deserializes from TOML with every field defaulted, so an
//! empty file is a valid configuration. Durations are written in humantime
//! form (`10s`, `500ms`). `QOS_CONFORMANCE_CLI` and
//! `QOS_CONFORMANCE_IMPLEMENTATIONS` override the file.

use crate::error::{ConformanceError, Result};
use crate::node::StringMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_IMPLEMENTATION: &str = "rmw_fastrtps_cpp";
pub const CLI_ENV: &str = "QOS_CONFORMANCE_CLI";
pub const IMPLEMENTATIONS_ENV: &str = "QOS_CONFORMANCE_IMPLEMENTATIONS";

fn default_cli() -> String {
    "ros2".to_owned()
}

fn default_message_type() -> String {
    "std_msgs/String".to_owned()
}

fn default_payload() -> String {
    "hello".to_owned()
}

fn default_implementation_env_var() -> String {
    "RMW_IMPLEMENTATION".to_owned()
}

fn default_implementations() -> Vec<String> {
    match std::env::var("RMW_IMPLEMENTATION") {
        Ok(value) if !value.trim().is_empty() => vec![value.trim().to_owned()],
        _ => vec![DEFAULT_IMPLEMENTATION.to_owned()],
    }
}

fn default_message_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_echo_window() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_publish_period() -> Duration {
    Duration::from_millis(500)
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Program providing `topic pub`, `topic echo` and `daemon` subcommands.
    #[serde(default = "default_cli")]
    pub cli: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default = "default_payload")]
    pub payload: String,
    /// Variable selecting the middleware implementation in child processes.
    #[serde(default = "default_implementation_env_var")]
    pub implementation_env_var: String,
    #[serde(default = "default_implementations")]
    pub implementations: Vec<String>,
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,
    /// Upper bound on waiting for the first message in pub mode.
    #[serde(default = "default_message_timeout", with = "humantime_serde")]
    pub message_timeout: Duration,
    /// How long the echo command is left running while the fixture publishes.
    #[serde(default = "default_echo_window", with = "humantime_serde")]
    pub echo_window: Duration,
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    #[serde(default = "default_publish_period", with = "humantime_serde")]
    pub publish_period: Duration,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_true")]
    pub restart_daemon: bool,
    #[serde(default)]
    pub unique_topics: bool,
    /// Captured lines starting with any of these are dropped as middleware noise.
    #[serde(default)]
    pub noise_prefixes: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cli: default_cli(),
            message_type: default_message_type(),
            payload: default_payload(),
            implementation_env_var: default_implementation_env_var(),
            implementations: default_implementations(),
            extra_env: BTreeMap::new(),
            message_timeout: default_message_timeout(),
            echo_window: default_echo_window(),
            shutdown_timeout: default_shutdown_timeout(),
            publish_period: default_publish_period(),
            retry_attempts: default_retry_attempts(),
            restart_daemon: true,
            unique_topics: false,
            noise_prefixes: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// # Errors
    /// Returns [`ConformanceError::Io`], [`ConformanceError::Toml`], or a
    /// [`ConformanceError::Configuration`] from [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConformanceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConformanceError::Toml {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `QOS_CONFORMANCE_CLI` and `QOS_CONFORMANCE_IMPLEMENTATIONS`
    /// (comma separated) on top of this configuration.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(cli) = std::env::var(CLI_ENV) {
            if !cli.trim().is_empty() {
                self.cli = cli.trim().to_owned();
            }
        }
        if let Ok(list) = std::env::var(IMPLEMENTATIONS_ENV) {
            let implementations: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            if !implementations.is_empty() {
                self.implementations = implementations;
            }
        }
        self
    }

    /// # Errors
    /// Returns [`ConformanceError::Configuration`] for values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.cli.trim().is_empty() {
            return Err(ConformanceError::Configuration("cli must not be empty".into()));
        }
        if self.retry_attempts == 0 {
            return Err(ConformanceError::Configuration(
                "retry_attempts must be at least 1".into(),
            ));
        }
        if self.publish_period.is_zero() {
            return Err(ConformanceError::Configuration(
                "publish_period must be positive".into(),
            ));
        }
        if self.implementations.is_empty() {
            return Err(ConformanceError::Configuration(
                "at least one middleware implementation is required".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_cli(mut self, cli: impl Into<String>) -> Self {
        self.cli = cli.into();
        self
    }

    #[must_use]
    pub fn with_implementations(mut self, implementations: Vec<String>) -> Self {
        self.implementations = implementations;
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_echo_window(mut self, window: Duration) -> Self {
        self.echo_window = window;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_publish_period(mut self, period: Duration) -> Self {
        self.publish_period = period;
        self
    }

    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_restart_daemon(mut self, restart: bool) -> Self {
        self.restart_daemon = restart;
        self
    }

    #[must_use]
    pub fn message(&self) -> StringMessage {
        StringMessage::new(self.payload.clone())
    }

    /// Environment merged over the inherited one for every child process.
    #[must_use]
    pub fn env_overlay(&self, implementation: &str) -> Vec<(String, String)> {
        let mut env = vec![
            (self.implementation_env_var.clone(), implementation.to_owned()),
            ("PYTHONUNBUFFERED".to_owned(), "1".to_owned()),
        ];
        env.extend(self.extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.cli, "ros2");
        assert_eq!(config.message_timeout, Duration::from_secs(10));
        assert_eq!(config.echo_window, Duration::from_secs(5));
        assert_eq!(config.publish_period, Duration::from_millis(500));
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.message().to_echo_line(), "data: hello");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_humantime_durations() {
        let config: HarnessConfig = toml::from_str(
            r#"
cli = "/opt/ros/bin/ros2"
implementations = ["rmw_cyclonedds_cpp"]
message_timeout = "3s"
publish_period = "200ms"
retry_attempts = 2

[extra_env]
ROS_DOMAIN_ID = "42"
"#,
        )
        .unwrap();
        assert_eq!(config.cli, "/opt/ros/bin/ros2");
        assert_eq!(config.message_timeout, Duration::from_secs(3));
        assert_eq!(config.publish_period, Duration::from_millis(200));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_attempts, 2);
        assert!(config.restart_daemon);
        assert_eq!(config.extra_env.get("ROS_DOMAIN_ID").unwrap(), "42");
    }

    #[test]
    fn test_env_overlay() {
        let config = HarnessConfig::default().with_env("ROS_DOMAIN_ID", "7");
        let overlay = config.env_overlay("rmw_cyclonedds_cpp");
        assert_eq!(
            overlay[0],
            ("RMW_IMPLEMENTATION".to_owned(), "rmw_cyclonedds_cpp".to_owned())
        );
        assert!(overlay.contains(&("PYTHONUNBUFFERED".to_owned(), "1".to_owned())));
        assert!(overlay.contains(&("ROS_DOMAIN_ID".to_owned(), "7".to_owned())));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = HarnessConfig::default().with_retry_attempts(0);
        assert!(matches!(
            config.validate(),
            Err(ConformanceError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            HarnessConfig::load("/nonexistent/harness.toml"),
            Err(ConformanceError::Io { .. })
        ));
    }
}
