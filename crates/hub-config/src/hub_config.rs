//! Typed hub configuration
//!
//! Parsed from `hub.yaml` in the config directory. Every section and field is
//! optional:
//!
//! ```yaml
//! name: Home
//! rules:
//!   storage_dir: .storage/rules
//!   sweep_interval_secs: 1
//! event_bus:
//!   capacity: 1024
//! logging:
//!   level: info
//! ```

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE: &str = "hub.yaml";

/// Rule engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Rule storage directory, relative to the config directory unless absolute
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Seconds between re-evaluations of state-only rules
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RulesConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Events buffered per subscriber before slow subscribers lag
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_name() -> String {
    "Home".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".storage/rules")
}

fn default_sweep_interval() -> u64 {
    1
}

fn default_capacity() -> usize {
    1024
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            rules: RulesConfig::default(),
            event_bus: EventBusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HubConfig {
    /// Load the configuration from a config directory
    ///
    /// A missing `hub.yaml` yields the defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join(CONFIG_FILE).exists() {
            debug!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }

        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        Self::from_yaml(&yaml)
    }

    /// Parse and validate the configuration from a YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        // An empty file parses as null
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        let config: HubConfig =
            serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.rules.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rules.sweep_interval_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.event_bus.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "event_bus.capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Rule storage directory resolved against the config directory
    pub fn storage_dir(&self, config_dir: impl AsRef<Path>) -> PathBuf {
        if self.rules.storage_dir.is_absolute() {
            self.rules.storage_dir.clone()
        } else {
            config_dir.as_ref().join(&self.rules.storage_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.name, "Home");
        assert_eq!(config.rules.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.event_bus.capacity, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml: Value = serde_yaml::from_str(
            r#"
name: Cabin
rules:
  sweep_interval_secs: 5
"#,
        )
        .unwrap();

        let config = HubConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.name, "Cabin");
        assert_eq!(config.rules.sweep_interval_secs, 5);
        assert_eq!(config.rules.storage_dir, PathBuf::from(".storage/rules"));
        assert_eq!(config.event_bus, EventBusConfig::default());
    }

    #[test]
    fn test_rejects_zero_values() {
        let yaml: Value = serde_yaml::from_str("rules:\n  sweep_interval_secs: 0\n").unwrap();
        assert!(matches!(
            HubConfig::from_yaml(&yaml),
            Err(ConfigError::InvalidValue { key, .. }) if key == "rules.sweep_interval_secs"
        ));

        let yaml: Value = serde_yaml::from_str("event_bus:\n  capacity: 0\n").unwrap();
        assert!(matches!(
            HubConfig::from_yaml(&yaml),
            Err(ConfigError::InvalidValue { key, .. }) if key == "event_bus.capacity"
        ));
    }

    #[test]
    fn test_rejects_wrong_types() {
        let yaml: Value = serde_yaml::from_str("- a\n- b\n").unwrap();
        assert!(HubConfig::from_yaml(&yaml).is_err());

        let yaml: Value = serde_yaml::from_str("rules:\n  sweep_interval_secs: soon\n").unwrap();
        assert!(HubConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(HubConfig::load(dir.path()).unwrap(), HubConfig::default());

        std::fs::write(dir.path().join("logging.yaml"), "level: debug\n").unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "name: Flat\nlogging: !include logging.yaml\nrules:\n  storage_dir: /var/lib/hub/rules\n",
        )
        .unwrap();

        let config = HubConfig::load(dir.path()).unwrap();
        assert_eq!(config.name, "Flat");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.storage_dir(dir.path()),
            PathBuf::from("/var/lib/hub/rules")
        );
    }

    #[test]
    fn test_relative_storage_dir() {
        let config = HubConfig::default();
        assert_eq!(
            config.storage_dir("/etc/hub"),
            PathBuf::from("/etc/hub/.storage/rules")
        );
    }
}
