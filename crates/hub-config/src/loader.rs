//! YAML loader with custom tag support
//!
//! - `!include path` - Include another YAML file, relative to the including file
//! - `!env_var VAR [default]` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader resolving the hub's custom tags
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    /// Files currently being loaded, to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = Mapping::new();
                for (k, v) in map {
                    let processed_key = self.process_value(k, source_path)?;
                    let processed_value = self.process_value(v, source_path)?;
                    result.insert(processed_key, processed_value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        let value = tagged.value;

        trace!("Processing tag '{}' with value {:?}", tag, value);

        match tag.as_str() {
            "!include" => {
                let include_path = self.value_to_path(&value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!env_var" => Self::process_env_var(value),
            _ => {
                // Unknown tag, keep it but process the inner value
                let processed = self.process_value(value, source_path)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value: processed,
                })))
            }
        }
    }

    /// `!env_var NAME` or `!env_var NAME default value`
    fn process_env_var(value: Value) -> ConfigResult<Value> {
        let directive = match value {
            Value::String(s) => s,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "!env_var".to_string(),
                    reason: "environment variable name must be a string".to_string(),
                })
            }
        };

        let directive = directive.trim();
        let (var_name, default) = match directive.split_once(char::is_whitespace) {
            Some((name, default)) => (name, Some(default.trim())),
            None => (directive, None),
        };

        let resolved = match (std::env::var(var_name), default) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => {
                debug!("Environment variable {} not set, using default", var_name);
                return Ok(parse_scalar(default));
            }
            (Err(_), None) => {
                return Err(ConfigError::EnvVarNotFound {
                    var: var_name.to_string(),
                })
            }
        };

        debug!("Substituted env var: {}", var_name);
        Ok(parse_scalar(&resolved))
    }

    /// Convert a YAML value to a path, resolving relative to the source file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let path_str = match value {
            Value::String(s) => s.clone(),
            _ => {
                return Err(ConfigError::InvalidIncludePath {
                    path: format!("{:?}", value),
                    reason: "path must be a string".to_string(),
                })
            }
        };

        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        let resolved = if Path::new(&path_str).is_absolute() {
            PathBuf::from(&path_str)
        } else {
            base_dir.join(&path_str)
        };

        Ok(resolved)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// Substituted text is typed the way YAML would type it, so `"30"` becomes a
/// number and `"true"` a bool
fn parse_scalar(text: &str) -> Value {
    match serde_yaml::from_str::<Value>(text) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(text.to_string()),
    }
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir).load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let config_dir = config_dir.into();
    let source_path = config_dir.join(source_name);
    YamlLoader::new(config_dir).load_string(content, &source_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        value
            .as_mapping()
            .unwrap()
            .get(&Value::String(key.to_string()))
            .unwrap()
    }

    #[test]
    fn test_load_simple_yaml() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "hub.yaml", "name: Home\nrules:\n  sweep_interval_secs: 2\n");

        let value = load_yaml(dir.path(), "hub.yaml").unwrap();
        assert_eq!(get(&value, "name"), &Value::String("Home".to_string()));
        assert_eq!(
            get(get(&value, "rules"), "sweep_interval_secs").as_u64(),
            Some(2)
        );
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "parts/logging.yaml", "level: debug\n");
        write_file(dir.path(), "parts/all.yaml", "logging: !include logging.yaml\n");
        write_file(dir.path(), "hub.yaml", "nested: !include parts/all.yaml\n");

        let value = load_yaml(dir.path(), "hub.yaml").unwrap();
        let level = get(get(get(&value, "nested"), "logging"), "level");
        assert_eq!(level, &Value::String("debug".to_string()));
    }

    #[test]
    fn test_circular_include_detection() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "include_b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "include_a: !include a.yaml\n");

        let result = load_yaml(dir.path(), "a.yaml");
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }

    #[test]
    fn test_missing_include() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "hub.yaml", "rules: !include missing.yaml\n");

        let result = load_yaml(dir.path(), "hub.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_env_var() {
        std::env::set_var("HUB_CONFIG_TEST_NAME", "Cabin");
        std::env::set_var("HUB_CONFIG_TEST_INTERVAL", "15");

        let value = load_yaml_string(
            "/tmp",
            "name: !env_var HUB_CONFIG_TEST_NAME\ninterval: !env_var HUB_CONFIG_TEST_INTERVAL\n",
            "hub.yaml",
        )
        .unwrap();
        assert_eq!(get(&value, "name"), &Value::String("Cabin".to_string()));
        assert_eq!(get(&value, "interval").as_u64(), Some(15));

        std::env::remove_var("HUB_CONFIG_TEST_NAME");
        std::env::remove_var("HUB_CONFIG_TEST_INTERVAL");
    }

    #[test]
    fn test_env_var_default() {
        let value = load_yaml_string(
            "/tmp",
            "level: !env_var HUB_CONFIG_TEST_UNSET_LEVEL warn\ncapacity: !env_var HUB_CONFIG_TEST_UNSET_CAP 64\n",
            "hub.yaml",
        )
        .unwrap();
        assert_eq!(get(&value, "level"), &Value::String("warn".to_string()));
        assert_eq!(get(&value, "capacity").as_u64(), Some(64));
    }

    #[test]
    fn test_env_var_missing() {
        let result = load_yaml_string(
            "/tmp",
            "level: !env_var HUB_CONFIG_TEST_NOT_SET\n",
            "hub.yaml",
        );
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { var }) if var == "HUB_CONFIG_TEST_NOT_SET"));
    }
}
