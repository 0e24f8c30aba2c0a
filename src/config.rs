//! Configuration management for Chaser-CDP

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Debugger endpoint: a `ws://` debugger URL, or an `http://` endpoint to discover it from
    pub endpoint: String,

    /// Per-command timeouts
    pub timeouts: TimeoutConfig,

    /// Buffered events per method before the oldest are dropped for a lagging subscriber
    pub event_buffer: usize,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:9222".to_string(),
            timeouts: TimeoutConfig::default(),
            event_buffer: 256,
            log_level: "info".to_string(),
        }
    }
}

/// Command timeout configuration, in seconds. `0` disables the timeout for that class.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default timeout for most commands
    pub default_secs: u64,
    /// Timeout for page navigation commands
    pub navigation_secs: u64,
    /// Timeout for screenshot commands
    pub screenshot_secs: u64,
    /// Timeout for JavaScript execution
    pub execution_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: 30,
            navigation_secs: 60,
            screenshot_secs: 90,
            execution_secs: 30,
        }
    }
}

impl TimeoutConfig {
    /// No timeouts at all
    pub fn disabled() -> Self {
        Self {
            default_secs: 0,
            navigation_secs: 0,
            screenshot_secs: 0,
            execution_secs: 0,
        }
    }

    /// Get timeout duration for a specific command method
    pub fn for_method(&self, method: &str) -> Option<Duration> {
        let method_lower = method.to_lowercase();

        let secs = if method_lower.contains("screenshot") || method_lower.contains("capture") {
            self.screenshot_secs
        } else if method_lower.contains("navigate") || method_lower.contains("reload") {
            self.navigation_secs
        } else if method_lower.starts_with("runtime.evaluate")
            || method_lower.starts_with("runtime.call")
        {
            self.execution_secs
        } else {
            self.default_secs
        };

        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(endpoint) = env::var("CHASER_CDP_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Ok(timeout) = env::var("CHASER_CDP_TIMEOUT") {
            config.timeouts.default_secs = parse_var("CHASER_CDP_TIMEOUT", &timeout)?;
        }

        if let Ok(timeout) = env::var("CHASER_CDP_NAV_TIMEOUT") {
            config.timeouts.navigation_secs = parse_var("CHASER_CDP_NAV_TIMEOUT", &timeout)?;
        }

        if let Ok(timeout) = env::var("CHASER_CDP_SCREENSHOT_TIMEOUT") {
            config.timeouts.screenshot_secs = parse_var("CHASER_CDP_SCREENSHOT_TIMEOUT", &timeout)?;
        }

        if let Ok(timeout) = env::var("CHASER_CDP_EVAL_TIMEOUT") {
            config.timeouts.execution_secs = parse_var("CHASER_CDP_EVAL_TIMEOUT", &timeout)?;
        }

        if let Ok(buffer) = env::var("CHASER_CDP_EVENT_BUFFER") {
            config.event_buffer = parse_var("CHASER_CDP_EVENT_BUFFER", &buffer)?;
        }

        if let Ok(log_level) = env::var("CHASER_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(Error::configuration("event_buffer must be greater than zero"));
        }
        if self.endpoint.is_empty() {
            return Err(Error::configuration("endpoint must not be empty"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::configuration(format!("Invalid {}", name)))
}
