//! Rule persistence
//!
//! Every rule is stored as its own group keyed by the rule id. The
//! [`JsonRuleStorage`] keeps one versioned JSON file per rule:
//!
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "3f2b9c40-5d1e-4a7b-9c8d-0e1f2a3b4c5d",
//!   "data": { ... }
//! }
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::rule::Rule;

/// Current major version of stored rules
pub const RULE_STORAGE_VERSION: u32 = 1;
/// Current minor version of stored rules
pub const RULE_STORAGE_MINOR_VERSION: u32 = 1;

const FILE_SUFFIX: &str = ".json";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Migration required for {key}: from {from} to {to}")]
    MigrationRequired { key: String, from: u32, to: u32 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage file wrapper with version tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version - breaking changes
    pub version: u32,
    /// Minor version - compatible additions
    pub minor_version: u32,
    /// Group key
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            version: RULE_STORAGE_VERSION,
            minor_version: RULE_STORAGE_MINOR_VERSION,
            key: key.into(),
            data,
        }
    }
}

/// Key-value persistence of rules, one group per rule
#[async_trait]
pub trait RuleStorage: Send + Sync {
    /// Write a rule, replacing the group if it exists
    async fn save_rule(&self, group_key: &str, rule: &Rule) -> StorageResult<()>;

    /// Read a rule; `None` if the group does not exist
    async fn load_rule(&self, group_key: &str) -> StorageResult<Option<Rule>>;

    /// Delete a group; deleting a missing group is not an error
    async fn delete_rule_group(&self, group_key: &str) -> StorageResult<()>;

    /// All stored group keys
    async fn list_groups(&self) -> StorageResult<Vec<String>>;
}

/// Volatile storage for tests and ephemeral setups
#[derive(Debug, Default)]
pub struct MemoryRuleStorage {
    groups: DashMap<String, Rule>,
}

impl MemoryRuleStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[async_trait]
impl RuleStorage for MemoryRuleStorage {
    async fn save_rule(&self, group_key: &str, rule: &Rule) -> StorageResult<()> {
        self.groups.insert(group_key.to_string(), rule.clone());
        Ok(())
    }

    async fn load_rule(&self, group_key: &str) -> StorageResult<Option<Rule>> {
        Ok(self.groups.get(group_key).map(|r| r.clone()))
    }

    async fn delete_rule_group(&self, group_key: &str) -> StorageResult<()> {
        self.groups.remove(group_key);
        Ok(())
    }

    async fn list_groups(&self) -> StorageResult<Vec<String>> {
        Ok(self.groups.iter().map(|e| e.key().clone()).collect())
    }
}

/// One JSON file per rule under a directory
#[derive(Debug, Clone)]
pub struct JsonRuleStorage {
    storage_dir: PathBuf,
}

impl JsonRuleStorage {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the file path for a group key
    pub fn file_path(&self, group_key: &str) -> PathBuf {
        self.storage_dir.join(format!("{}{}", group_key, FILE_SUFFIX))
    }

    async fn ensure_dir(&self) -> StorageResult<()> {
        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!("Created rule storage directory: {:?}", self.storage_dir);
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStorage for JsonRuleStorage {
    /// Writes atomically by first writing to a temp file, then renaming.
    async fn save_rule(&self, group_key: &str, rule: &Rule) -> StorageResult<()> {
        self.ensure_dir().await?;

        let path = self.file_path(group_key);
        let temp_path = self.storage_dir.join(format!("{}{}.tmp", group_key, FILE_SUFFIX));

        let storage_file = StorageFile::new(group_key, rule);
        let content = serde_json::to_string_pretty(&storage_file)?;

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(group_key, "Saved rule");
        Ok(())
    }

    async fn load_rule(&self, group_key: &str) -> StorageResult<Option<Rule>> {
        let path = self.file_path(group_key);

        if !path.exists() {
            debug!(group_key, "Rule file not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;

        // Check the version before parsing the payload
        #[derive(Deserialize)]
        struct VersionInfo {
            version: u32,
            minor_version: u32,
        }

        let version_info: VersionInfo = serde_json::from_str(&content)?;
        if version_info.version != RULE_STORAGE_VERSION {
            return Err(StorageError::MigrationRequired {
                key: group_key.to_string(),
                from: version_info.version,
                to: RULE_STORAGE_VERSION,
            });
        }

        if version_info.minor_version < RULE_STORAGE_MINOR_VERSION {
            warn!(
                "Rule {} has older minor version ({} < {})",
                group_key, version_info.minor_version, RULE_STORAGE_MINOR_VERSION
            );
        }

        let storage_file: StorageFile<Rule> = serde_json::from_str(&content)?;
        Ok(Some(storage_file.data))
    }

    async fn delete_rule_group(&self, group_key: &str) -> StorageResult<()> {
        let path = self.file_path(group_key);

        if path.exists() {
            fs::remove_file(&path).await?;
            debug!(group_key, "Deleted rule");
        }

        Ok(())
    }

    async fn list_groups(&self) -> StorageResult<Vec<String>> {
        if !self.storage_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.storage_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Ok(file_type) = entry.file_type().await {
                if file_type.is_file() {
                    if let Some(name) = entry.file_name().to_str() {
                        // Temp files end in .tmp and are skipped here
                        if let Some(key) = name.strip_suffix(FILE_SUFFIX) {
                            keys.push(key.to_string());
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_action::{RuleAction, RuleActionParam};
    use crate::state_descriptor::StateDescriptor;
    use crate::state_evaluator::StateEvaluator;
    use hub_core::{ActionTypeId, ParamTypeId, StateTypeId, ThingId, ValueOperator};
    use tempfile::TempDir;

    fn sample_rule() -> Rule {
        let thing = ThingId::new();
        Rule::new("Heating")
            .with_condition(StateEvaluator::any(vec![
                StateEvaluator::leaf(StateDescriptor::for_thing(
                    thing,
                    StateTypeId::new(),
                    ValueOperator::LessThan,
                    18.5,
                )),
                StateEvaluator::all(vec![StateEvaluator::leaf(
                    StateDescriptor::for_interface("presence", "present", ValueOperator::Equals, true),
                )]),
            ]))
            .with_action(
                RuleAction::for_thing(thing, ActionTypeId::new())
                    .with_param(RuleActionParam::value(ParamTypeId::new(), 21)),
            )
    }

    #[tokio::test]
    async fn test_json_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonRuleStorage::new(temp_dir.path().join("rules"));
        let rule = sample_rule();
        let key = rule.id.to_string();

        storage.save_rule(&key, &rule).await.unwrap();
        assert!(storage.file_path(&key).exists());

        let loaded = storage.load_rule(&key).await.unwrap().unwrap();
        assert_eq!(loaded, rule);
        assert_eq!(storage.list_groups().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_json_missing_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonRuleStorage::new(temp_dir.path());
        let rule = sample_rule();
        let key = rule.id.to_string();

        assert!(storage.load_rule(&key).await.unwrap().is_none());
        assert!(storage.list_groups().await.unwrap().is_empty());

        storage.save_rule(&key, &rule).await.unwrap();
        storage.delete_rule_group(&key).await.unwrap();
        storage.delete_rule_group(&key).await.unwrap();
        assert!(storage.list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_version_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonRuleStorage::new(temp_dir.path());
        let rule = sample_rule();
        let key = rule.id.to_string();

        let mut file = StorageFile::new(key.clone(), &rule);
        file.version = 2;
        std::fs::write(storage.file_path(&key), serde_json::to_string(&file).unwrap()).unwrap();

        assert!(matches!(
            storage.load_rule(&key).await,
            Err(StorageError::MigrationRequired { from: 2, to: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryRuleStorage::new();
        let rule = sample_rule();
        let key = rule.id.to_string();

        storage.save_rule(&key, &rule).await.unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.load_rule(&key).await.unwrap(), Some(rule));

        storage.delete_rule_group(&key).await.unwrap();
        assert!(storage.is_empty());
    }
}
