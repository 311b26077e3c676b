//! A single state condition
//!
//! A descriptor either names a concrete state of a concrete thing, or a state
//! name of an interface. The interface form matches if any implementing thing
//! satisfies the comparison.

use hub_core::{compare, StateTypeId, ThingId, Value, ValueOperator, ValueType};
use hub_things::ThingRegistry;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// What a state descriptor points at
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateTarget {
    /// Neutral leaf: always valid, always matching
    #[default]
    Unset,

    /// A state of one thing
    Thing {
        thing_id: ThingId,
        state_type_id: StateTypeId,
    },

    /// A state of any thing implementing the interface
    Interface { interface: String, state: String },
}

/// "State S satisfies OP against V"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDescriptor {
    #[serde(default)]
    pub target: StateTarget,

    /// Value compared against
    pub value: Value,

    #[serde(default)]
    pub operator: ValueOperator,

    /// Type the value was entered as, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
}

impl Default for StateDescriptor {
    fn default() -> Self {
        Self {
            target: StateTarget::Unset,
            value: Value::Bool(false),
            operator: ValueOperator::Equals,
            value_type: None,
        }
    }
}

impl StateDescriptor {
    /// Condition on a state of one thing
    pub fn for_thing(
        thing_id: ThingId,
        state_type_id: StateTypeId,
        operator: ValueOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            target: StateTarget::Thing {
                thing_id,
                state_type_id,
            },
            value: value.into(),
            operator,
            value_type: None,
        }
    }

    /// Condition on a state of any thing implementing `interface`
    pub fn for_interface(
        interface: impl Into<String>,
        state: impl Into<String>,
        operator: ValueOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            target: StateTarget::Interface {
                interface: interface.into(),
                state: state.into(),
            },
            value: value.into(),
            operator,
            value_type: None,
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.target, StateTarget::Unset)
    }

    /// Reset to the neutral unset descriptor
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The referenced thing, for thing-targeted descriptors
    pub fn thing_id(&self) -> Option<ThingId> {
        match &self.target {
            StateTarget::Thing { thing_id, .. } => Some(*thing_id),
            _ => None,
        }
    }

    /// The referenced interface, for interface-targeted descriptors
    pub fn interface(&self) -> Option<&str> {
        match &self.target {
            StateTarget::Interface { interface, .. } => Some(interface),
            _ => None,
        }
    }

    /// Check the descriptor against the registry
    ///
    /// Returns the reason on failure.
    pub fn validate(&self, registry: &dyn ThingRegistry) -> Result<(), String> {
        match &self.target {
            StateTarget::Unset => Ok(()),
            StateTarget::Thing {
                thing_id,
                state_type_id,
            } => {
                if !registry.thing_exists(thing_id) {
                    return Err(format!("thing {} not found", thing_id));
                }
                if !registry.thing_has_state(thing_id, state_type_id) {
                    return Err(format!("thing {} has no state {}", thing_id, state_type_id));
                }
                if let Some(value_type) = self.value_type {
                    if self.value.convert(value_type).is_none() {
                        return Err(format!("{} is not a valid {}", self.value, value_type));
                    }
                }
                match registry.state_type_constraints(thing_id, state_type_id) {
                    Some(constraints) => constraints
                        .check(&self.value)
                        .map(|_| ())
                        .map_err(|reason| format!("state {}: {}", state_type_id, reason)),
                    None => Ok(()),
                }
            }
            StateTarget::Interface { interface, state } => {
                if registry.interface_declares_state(interface, state) {
                    Ok(())
                } else {
                    Err(format!("interface {} has no state {}", interface, state))
                }
            }
        }
    }

    pub fn is_valid(&self, registry: &dyn ThingRegistry) -> bool {
        self.validate(registry).is_ok()
    }

    /// Compare against the current state values
    ///
    /// Missing things or states do not match.
    pub fn matches(&self, registry: &dyn ThingRegistry) -> bool {
        match &self.target {
            StateTarget::Unset => true,
            StateTarget::Thing {
                thing_id,
                state_type_id,
            } => match registry.current_state_value(thing_id, state_type_id) {
                Some(current) => {
                    let matching = compare(&current, self.operator, &self.value);
                    trace!(
                        %thing_id,
                        %state_type_id,
                        %current,
                        operator = %self.operator,
                        value = %self.value,
                        matching,
                        "Evaluated state descriptor"
                    );
                    matching
                }
                None => {
                    warn!(%thing_id, %state_type_id, "State not available, descriptor not matching");
                    false
                }
            },
            StateTarget::Interface { interface, state } => {
                let matching = registry.things_implementing(interface).iter().any(|thing_id| {
                    registry
                        .state_value_by_name(thing_id, state)
                        .map(|current| compare(&current, self.operator, &self.value))
                        .unwrap_or(false)
                });
                trace!(interface, state, matching, "Evaluated interface state descriptor");
                matching
            }
        }
    }
}
