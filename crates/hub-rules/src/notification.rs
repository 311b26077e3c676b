//! Notifications and log entries published by the engine

use chrono::{DateTime, Utc};
use hub_core::RuleId;
use serde::{Deserialize, Serialize};

use crate::rule::Rule;

/// Rule lifecycle notification for API subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notification", content = "params", rename_all = "snake_case")]
pub enum RuleNotification {
    RuleAdded(Rule),
    RuleRemoved(RuleId),
    RuleActiveChanged { rule_id: RuleId, active: bool },
    RuleConfigurationChanged(Rule),
}

impl RuleNotification {
    /// The rule this notification is about
    pub fn rule_id(&self) -> RuleId {
        match self {
            RuleNotification::RuleAdded(rule) | RuleNotification::RuleConfigurationChanged(rule) => {
                rule.id
            }
            RuleNotification::RuleRemoved(rule_id)
            | RuleNotification::RuleActiveChanged { rule_id, .. } => *rule_id,
        }
    }
}

/// What happened to a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLogKind {
    /// A trigger event matched
    Trigger,
    /// The rule became active or inactive
    ActiveChange,
    /// The rule was enabled or disabled
    EnabledChange,
    ActionsExecuted,
    ExitActionsExecuted,
}

/// One entry for the log collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleLogEntry {
    pub rule_id: RuleId,
    pub kind: RuleLogKind,
    /// New value for active/enabled changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl RuleLogEntry {
    pub fn new(rule_id: RuleId, kind: RuleLogKind) -> Self {
        Self {
            rule_id,
            kind,
            value: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_value(mut self, value: bool) -> Self {
        self.value = Some(value);
        self
    }
}
