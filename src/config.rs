// Harness Configuration
//
// Scenario deadlines, collector sweep cadence and diagnostic capture
// settings. Loaded from TOML; every section falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Sweeper settings for the collector
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Snapshot capture settings
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Scenario deadlines and pacing
    #[serde(default)]
    pub scenarios: ScenarioConfig,
}

/// Collector sweeper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Interval between automatic sweeps (in milliseconds)
    #[serde(with = "serde_millis")]
    pub sweep_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(250),
        }
    }
}

/// Diagnostic capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Write snapshots at scenario checkpoints
    pub enabled: bool,

    /// Directory snapshots are written to
    pub output_dir: PathBuf,

    /// Delay before the follow-up snapshot (in milliseconds)
    #[serde(with = "serde_millis")]
    pub delayed_capture: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("snapshots"),
            delayed_capture: Duration::from_secs(3),
        }
    }
}

/// Scenario deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Deadline for single-request scenarios (in milliseconds)
    #[serde(with = "serde_millis")]
    pub single_request_timeout: Duration,

    /// Deadline for multi-step push scenarios (in milliseconds)
    #[serde(with = "serde_millis")]
    pub multi_step_timeout: Duration,

    /// Delay before the external publish in push scenarios (in milliseconds)
    #[serde(with = "serde_millis")]
    pub publish_delay: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            single_request_timeout: Duration::from_secs(30),
            multi_step_timeout: Duration::from_secs(60),
            publish_delay: Duration::from_millis(1500),
        }
    }
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl HarnessConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector.sweep_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "collector.sweep_interval must be greater than zero".to_string(),
            ));
        }

        let scenarios = &self.scenarios;
        for (name, value) in [
            ("single_request_timeout", scenarios.single_request_timeout),
            ("multi_step_timeout", scenarios.multi_step_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "scenarios.{}: timeout must be greater than zero",
                    name
                )));
            }
        }

        // The event has to arrive before the deadline can be met at all
        if scenarios.publish_delay >= scenarios.multi_step_timeout {
            return Err(ConfigError::ValidationError(
                "scenarios.publish_delay must be shorter than multi_step_timeout".to_string(),
            ));
        }

        if self.diagnostics.enabled && self.diagnostics.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "diagnostics.output_dir must be set when diagnostics are enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scenarios.single_request_timeout, Duration::from_secs(30));
        assert_eq!(config.scenarios.multi_step_timeout, Duration::from_secs(60));
        assert_eq!(config.scenarios.publish_delay, Duration::from_millis(1500));
        assert_eq!(config.diagnostics.delayed_capture, Duration::from_secs(3));
    }

    #[test]
    fn test_validate_zero_sweep_interval() {
        let mut config = HarnessConfig::default();
        config.collector.sweep_interval = Duration::ZERO;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("sweep_interval must be greater than zero"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = HarnessConfig::default();
        config.scenarios.single_request_timeout = Duration::ZERO;

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("single_request_timeout"));
    }

    #[test]
    fn test_validate_publish_after_deadline() {
        let mut config = HarnessConfig::default();
        config.scenarios.publish_delay = Duration::from_secs(90);

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("publish_delay must be shorter"));
    }

    #[test]
    fn test_from_toml_partial() {
        let toml_str = r#"
            [scenarios]
            single_request_timeout = 5000

            [diagnostics]
            enabled = false
        "#;

        let config = HarnessConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.scenarios.single_request_timeout, Duration::from_secs(5));
        assert_eq!(config.scenarios.multi_step_timeout, Duration::from_secs(60));
        assert!(!config.diagnostics.enabled);
        assert_eq!(config.collector.sweep_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leakprobe.toml");

        let mut config = HarnessConfig::default();
        config.scenarios.publish_delay = Duration::from_millis(20);
        config.to_file(&path).unwrap();

        let loaded = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(loaded.scenarios.publish_delay, Duration::from_millis(20));
        assert_eq!(loaded.diagnostics.output_dir, PathBuf::from("snapshots"));
    }
}
