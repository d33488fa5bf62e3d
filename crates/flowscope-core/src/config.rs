//! Configuration loading for the control loop and engine session.
//!
//! Configuration is read from a YAML file. Every field has a default so a
//! partial file, or none at all, still yields a runnable setup.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the configuration file.
    #[error("failed to read config file: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Could not parse the YAML content.
    #[error("failed to parse config: {source}")]
    Parse {
        /// Underlying parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// The parsed configuration is not usable.
    #[error("invalid config: {message}")]
    Invalid {
        /// What is wrong with it.
        message: String,
    },
}

const fn default_port() -> u16 {
    9999
}

const fn default_step_length_s() -> f64 {
    0.1
}

const fn default_startup_wait_ms() -> u64 {
    2000
}

const fn default_interval_ms() -> u64 {
    33
}

const fn default_stress_quota() -> u32 {
    100
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_scenario() -> String {
    "scenario.cfg".to_owned()
}

fn default_vehicle_type() -> String {
    "DEFAULT_VEHTYPE".to_owned()
}

fn default_export_directory() -> String {
    ".".to_owned()
}

/// How to launch and reach the external engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Command used to launch the engine. Empty means attach to an engine
    /// that is already running.
    #[serde(default)]
    pub launch_command: String,

    /// Scenario file handed to the engine at launch.
    #[serde(default = "default_scenario")]
    pub scenario: String,

    /// Host the engine control socket listens on.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the engine control socket listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Simulated seconds advanced per engine step.
    #[serde(default = "default_step_length_s")]
    pub step_length_s: f64,

    /// How long to keep retrying the initial connection, in milliseconds.
    #[serde(default = "default_startup_wait_ms")]
    pub startup_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            launch_command: String::new(),
            scenario: default_scenario(),
            host: default_host(),
            port: default_port(),
            step_length_s: default_step_length_s(),
            startup_wait_ms: default_startup_wait_ms(),
        }
    }
}

/// Frame pacing of the control loop.
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    /// Wall-clock delay between loop iterations, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

/// Defaults for stress-injection campaigns.
#[derive(Debug, Clone, Deserialize)]
pub struct StressConfig {
    /// Vehicles injected by a campaign when no explicit count is given.
    #[serde(default = "default_stress_quota")]
    pub default_quota: u32,

    /// Vehicle type used for stress-injected vehicles.
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            default_quota: default_stress_quota(),
            vehicle_type: default_vehicle_type(),
        }
    }
}

/// Where statistics exports are written.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Directory CSV exports are written into.
    #[serde(default = "default_export_directory")]
    pub directory: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowConfig {
    /// Engine launch and connection settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Control loop pacing.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Stress-injection defaults.
    #[serde(default)]
    pub stress: StressConfig,

    /// Statistics export settings.
    #[serde(default)]
    pub export: ExportConfig,
}

impl FlowConfig {
    /// Loads and validates configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates configuration from YAML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.step_length_s <= 0.0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "engine.step_length_s must be positive, got {}",
                    self.engine.step_length_s
                ),
            });
        }
        if self.pacing.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "pacing.interval_ms must be at least 1".to_owned(),
            });
        }
        if self.stress.default_quota == 0 {
            return Err(ConfigError::Invalid {
                message: "stress.default_quota must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let yaml = r#"
engine:
  launch_command: "engine-bin"
  scenario: "demo/net.cfg"
  host: "10.0.0.5"
  port: 8873
  step_length_s: 0.25
  startup_wait_ms: 500
pacing:
  interval_ms: 50
stress:
  default_quota: 25
  vehicle_type: "van"
export:
  directory: "out"
"#;
        let config = FlowConfig::parse(yaml).unwrap();
        assert_eq!(config.engine.launch_command, "engine-bin");
        assert_eq!(config.engine.host, "10.0.0.5");
        assert_eq!(config.engine.port, 8873);
        assert!((config.engine.step_length_s - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.pacing.interval_ms, 50);
        assert_eq!(config.stress.default_quota, 25);
        assert_eq!(config.stress.vehicle_type, "van");
        assert_eq!(config.export.directory, "out");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let yaml = "engine:\n  port: 1234\n";
        let config = FlowConfig::parse(yaml).unwrap();
        assert_eq!(config.engine.port, 1234);
        assert_eq!(config.engine.host, "127.0.0.1");
        assert!(config.engine.launch_command.is_empty());
        assert_eq!(config.pacing.interval_ms, 33);
        assert_eq!(config.stress.default_quota, 100);
        assert_eq!(config.stress.vehicle_type, "DEFAULT_VEHTYPE");
        assert_eq!(config.export.directory, ".");
    }

    #[test]
    fn zero_step_length_is_rejected() {
        let yaml = "engine:\n  step_length_s: 0.0\n";
        let err = FlowConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let yaml = "pacing:\n  interval_ms: 0\n";
        assert!(FlowConfig::parse(yaml).is_err());
    }
}
