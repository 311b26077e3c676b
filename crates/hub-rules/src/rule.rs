//! Rule definition
//!
//! A rule ties together trigger events, a condition tree and two action lists:
//! `actions` fire when the rule becomes active, `exit_actions` when it
//! becomes inactive again.

use hub_core::{RuleId, ThingId};
use serde::{Deserialize, Serialize};

use crate::event_descriptor::EventDescriptor;
use crate::rule_action::RuleAction;
use crate::state_evaluator::StateEvaluator;

/// An automation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether the actions may be run by hand
    #[serde(default = "default_true")]
    pub executable: bool,

    /// Any of these triggers the rule; empty means state-only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_descriptors: Vec<EventDescriptor>,

    #[serde(default, skip_serializing_if = "StateEvaluator::is_empty")]
    pub state_evaluator: StateEvaluator,

    #[serde(default)]
    pub actions: Vec<RuleAction>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit_actions: Vec<RuleAction>,

    /// Latched activation state, owned by the engine
    #[serde(skip)]
    pub(crate) active: bool,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Create an enabled, executable rule with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RuleId::new(),
            name: name.into(),
            enabled: true,
            executable: true,
            event_descriptors: Vec::new(),
            state_evaluator: StateEvaluator::new(),
            actions: Vec::new(),
            exit_actions: Vec::new(),
            active: false,
        }
    }

    pub fn with_id(mut self, id: RuleId) -> Self {
        self.id = id;
        self
    }

    pub fn with_event(mut self, descriptor: EventDescriptor) -> Self {
        self.event_descriptors.push(descriptor);
        self
    }

    pub fn with_condition(mut self, evaluator: StateEvaluator) -> Self {
        self.state_evaluator = evaluator;
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_exit_action(mut self, action: RuleAction) -> Self {
        self.exit_actions.push(action);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    /// Whether the condition currently holds and actions fired for it
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Rules without trigger events are evaluated on state changes and sweeps
    pub fn is_state_only(&self) -> bool {
        self.event_descriptors.is_empty()
    }

    /// Get display name (name or id)
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }

    /// Whether any part of the rule references the thing
    pub fn contains_thing(&self, thing_id: &ThingId) -> bool {
        self.event_descriptors
            .iter()
            .any(|d| d.thing_id().as_ref() == Some(thing_id))
            || self.state_evaluator.contains_thing(thing_id)
            || self
                .actions
                .iter()
                .chain(&self.exit_actions)
                .any(|a| a.references_thing(thing_id))
    }

    /// Strip every reference to the thing
    ///
    /// Condition descriptors are cleared to neutral; triggers and actions
    /// touching the thing are dropped.
    pub fn remove_thing(&mut self, thing_id: &ThingId) {
        self.event_descriptors
            .retain(|d| d.thing_id().as_ref() != Some(thing_id));
        self.state_evaluator.remove_thing(thing_id);
        self.actions.retain(|a| !a.references_thing(thing_id));
        self.exit_actions.retain(|a| !a.references_thing(thing_id));
    }

    /// Thing ids referenced anywhere in the rule
    pub fn contained_things(&self) -> Vec<ThingId> {
        let mut things = Vec::new();
        let candidates = self
            .event_descriptors
            .iter()
            .filter_map(EventDescriptor::thing_id)
            .chain(self.state_evaluator.contained_things())
            .chain(
                self.actions
                    .iter()
                    .chain(&self.exit_actions)
                    .filter_map(RuleAction::thing_id),
            );
        for thing_id in candidates {
            if !things.contains(&thing_id) {
                things.push(thing_id);
            }
        }
        things
    }

    pub fn has_event_based_actions(&self) -> bool {
        self.actions.iter().any(RuleAction::is_event_based)
    }

    pub fn has_event_based_exit_actions(&self) -> bool {
        self.exit_actions.iter().any(RuleAction::is_event_based)
    }
}
