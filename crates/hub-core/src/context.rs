//! Causality tracking for events and actions

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::RuleId;

/// Links an event or action to whatever caused it
///
/// Actions fired by a rule carry a child of the triggering event's context
/// and the id of the rule, so log consumers can follow a device event through
/// the rule that reacted to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier (ULID)
    pub id: String,

    /// Context of the event or action that caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Rule that fired the action, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
}

impl Context {
    /// Create a root context
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
            rule_id: None,
        }
    }

    /// Create the context for an action fired by `rule_id`
    ///
    /// `parent` is the context of the triggering event, when there is one.
    pub fn for_rule(rule_id: RuleId, parent: Option<&Context>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: parent.map(|p| p.id.clone()),
            rule_id: Some(rule_id),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
