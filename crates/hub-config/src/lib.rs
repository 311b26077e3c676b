//! YAML configuration loading for the hub
//!
//! The hub reads `hub.yaml` from its config directory. Two custom tags are
//! understood:
//!
//! - `!include path` - Include another YAML file
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use hub_config::HubConfig;
//!
//! let config = HubConfig::load("/etc/hub")?;
//! let storage_dir = config.storage_dir("/etc/hub");
//! ```

mod error;
mod hub_config;
mod loader;

pub use error::{ConfigError, ConfigResult};
pub use hub_config::{EventBusConfig, HubConfig, LoggingConfig, RulesConfig, CONFIG_FILE};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};

pub use serde_yaml::Value;
