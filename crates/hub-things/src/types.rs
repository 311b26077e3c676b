//! Thing metadata: classes, interfaces and their state/event/action types

use hub_core::{
    compare, ActionTypeId, EventTypeId, ParamTypeId, StateTypeId, ThingClassId, ThingId, Value,
    ValueOperator, ValueType,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared type of an event or action param
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamType {
    pub id: ParamTypeId,
    pub name: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
}

impl ParamType {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id: ParamTypeId::new(),
            name: name.into(),
            value_type,
            default_value: None,
            min_value: None,
            max_value: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: ParamTypeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_range(mut self, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.min_value = Some(min.into());
        self.max_value = Some(max.into());
        self
    }

    /// Value constraints of this param
    pub fn constraints(&self) -> ValueConstraints {
        ValueConstraints {
            value_type: self.value_type,
            min_value: self.min_value.clone(),
            max_value: self.max_value.clone(),
            allowed_values: self.allowed_values.clone(),
        }
    }
}

/// Declared type of a state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateType {
    pub id: StateTypeId,
    pub name: String,
    pub value_type: ValueType,
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_values: Vec<Value>,
}

impl StateType {
    pub fn new(name: impl Into<String>, value_type: ValueType, default_value: Value) -> Self {
        Self {
            id: StateTypeId::new(),
            name: name.into(),
            value_type,
            default_value,
            min_value: None,
            max_value: None,
            possible_values: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: StateTypeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_range(mut self, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.min_value = Some(min.into());
        self.max_value = Some(max.into());
        self
    }

    pub fn with_possible_values(mut self, values: Vec<Value>) -> Self {
        self.possible_values = values;
        self
    }

    /// Value constraints of this state
    pub fn constraints(&self) -> ValueConstraints {
        ValueConstraints {
            value_type: self.value_type,
            min_value: self.min_value.clone(),
            max_value: self.max_value.clone(),
            allowed_values: self.possible_values.clone(),
        }
    }
}

/// Declared type of an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    pub id: EventTypeId,
    pub name: String,
    #[serde(default)]
    pub param_types: Vec<ParamType>,
}

impl EventType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EventTypeId::new(),
            name: name.into(),
            param_types: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: EventTypeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_param(mut self, param_type: ParamType) -> Self {
        self.param_types.push(param_type);
        self
    }
}

/// Declared type of an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionType {
    pub id: ActionTypeId,
    pub name: String,
    #[serde(default)]
    pub param_types: Vec<ParamType>,
}

impl ActionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActionTypeId::new(),
            name: name.into(),
            param_types: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: ActionTypeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_param(mut self, param_type: ParamType) -> Self {
        self.param_types.push(param_type);
        self
    }

    pub fn param_type(&self, id: &ParamTypeId) -> Option<&ParamType> {
        self.param_types.iter().find(|p| &p.id == id)
    }

    pub fn param_type_by_name(&self, name: &str) -> Option<&ParamType> {
        self.param_types.iter().find(|p| p.name == name)
    }
}

/// A capability contract shared by thing classes (e.g. "light")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            events: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_state(mut self, name: impl Into<String>) -> Self {
        self.states.push(name.into());
        self
    }

    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        self.events.push(name.into());
        self
    }

    pub fn with_action(mut self, name: impl Into<String>) -> Self {
        self.actions.push(name.into());
        self
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.iter().any(|s| s == name)
    }

    /// States emit a change event of the same name
    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e == name) || self.has_state(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a == name)
    }
}

/// Describes a kind of thing: its states, events, actions and interfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingClass {
    pub id: ThingClassId,
    pub name: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub state_types: Vec<StateType>,
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub action_types: Vec<ActionType>,
}

impl ThingClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ThingClassId::new(),
            name: name.into(),
            interfaces: Vec::new(),
            state_types: Vec::new(),
            event_types: Vec::new(),
            action_types: Vec::new(),
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_state_type(mut self, state_type: StateType) -> Self {
        self.state_types.push(state_type);
        self
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    pub fn with_action_type(mut self, action_type: ActionType) -> Self {
        self.action_types.push(action_type);
        self
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    pub fn state_type(&self, id: &StateTypeId) -> Option<&StateType> {
        self.state_types.iter().find(|s| &s.id == id)
    }

    pub fn state_type_by_name(&self, name: &str) -> Option<&StateType> {
        self.state_types.iter().find(|s| s.name == name)
    }

    pub fn event_type(&self, id: &EventTypeId) -> Option<&EventType> {
        self.event_types.iter().find(|e| &e.id == id)
    }

    /// Name of an event, including the implicit change event of every state
    pub fn event_name(&self, id: &EventTypeId) -> Option<&str> {
        if let Some(event_type) = self.event_type(id) {
            return Some(&event_type.name);
        }
        self.state_types
            .iter()
            .find(|s| s.id.as_uuid() == id.as_uuid())
            .map(|s| s.name.as_str())
    }

    pub fn action_type(&self, id: &ActionTypeId) -> Option<&ActionType> {
        self.action_types.iter().find(|a| &a.id == id)
    }

    pub fn action_type_by_name(&self, name: &str) -> Option<&ActionType> {
        self.action_types.iter().find(|a| a.name == name)
    }
}

/// A configured thing and its live state values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing {
    pub id: ThingId,
    pub name: String,
    pub thing_class_id: ThingClassId,
    #[serde(default)]
    pub states: HashMap<StateTypeId, Value>,
    /// Whether the hardware behind the thing is currently reachable
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl Thing {
    pub fn state_value(&self, state_type_id: &StateTypeId) -> Option<&Value> {
        self.states.get(state_type_id)
    }
}

/// Type and range restrictions of a state or param value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueConstraints {
    pub value_type: ValueType,
    pub min_value: Option<Value>,
    pub max_value: Option<Value>,
    pub allowed_values: Vec<Value>,
}

impl ValueConstraints {
    /// Convert `value` to the declared type and check it against min, max and
    /// the allowed values
    ///
    /// Returns the converted value, or a human readable reason.
    pub fn check(&self, value: &Value) -> Result<Value, String> {
        let converted = value
            .convert(self.value_type)
            .ok_or_else(|| format!("cannot convert {} to {}", value, self.value_type))?;

        if let Some(max) = &self.max_value {
            if compare(&converted, ValueOperator::GreaterThan, max) {
                return Err(format!("{} is above the maximum {}", converted, max));
            }
        }

        if let Some(min) = &self.min_value {
            if compare(&converted, ValueOperator::LessThan, min) {
                return Err(format!("{} is below the minimum {}", converted, min));
            }
        }

        if !self.allowed_values.is_empty()
            && !self
                .allowed_values
                .iter()
                .any(|allowed| compare(&converted, ValueOperator::Equals, allowed))
        {
            return Err(format!("{} is not one of the allowed values", converted));
        }

        Ok(converted)
    }
}
