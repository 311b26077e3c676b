//! Trigger filters matched against incoming events

use hub_core::{compare, Event, EventTypeId, ParamTypeId, ThingId, Value, ValueOperator};
use hub_things::ThingRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// A param referenced by type id or, for interface-based descriptors and
/// actions, by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRef {
    Id(ParamTypeId),
    Name(String),
}

impl From<ParamTypeId> for ParamRef {
    fn from(id: ParamTypeId) -> Self {
        ParamRef::Id(id)
    }
}

impl From<&str> for ParamRef {
    fn from(name: &str) -> Self {
        ParamRef::Name(name.to_string())
    }
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamRef::Id(id) => write!(f, "{}", id),
            ParamRef::Name(name) => f.write_str(name),
        }
    }
}

/// Where a matching event must come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventSource {
    /// One event type of one thing
    Thing {
        thing_id: ThingId,
        event_type_id: EventTypeId,
    },

    /// A named event of any thing implementing the interface
    Interface { interface: String, event: String },
}

/// Constraint on one param of the event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub param: ParamRef,
    #[serde(default)]
    pub operator: ValueOperator,
    pub value: Value,
}

impl ParamDescriptor {
    pub fn new(param: impl Into<ParamRef>, operator: ValueOperator, value: impl Into<Value>) -> Self {
        Self {
            param: param.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Trigger filter of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub source: EventSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<ParamDescriptor>,
}

impl EventDescriptor {
    pub fn for_thing(thing_id: ThingId, event_type_id: EventTypeId) -> Self {
        Self {
            source: EventSource::Thing {
                thing_id,
                event_type_id,
            },
            param: None,
        }
    }

    pub fn for_interface(interface: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            source: EventSource::Interface {
                interface: interface.into(),
                event: event.into(),
            },
            param: None,
        }
    }

    pub fn with_param(mut self, param: ParamDescriptor) -> Self {
        self.param = Some(param);
        self
    }

    /// The referenced thing, for thing-based descriptors
    pub fn thing_id(&self) -> Option<ThingId> {
        match &self.source {
            EventSource::Thing { thing_id, .. } => Some(*thing_id),
            EventSource::Interface { .. } => None,
        }
    }

    /// The referenced event type, for thing-based descriptors
    pub fn event_type_id(&self) -> Option<EventTypeId> {
        match &self.source {
            EventSource::Thing { event_type_id, .. } => Some(*event_type_id),
            EventSource::Interface { .. } => None,
        }
    }

    /// Whether the event satisfies this descriptor
    pub fn matches(&self, event: &Event, registry: &dyn ThingRegistry) -> bool {
        let source_matches = match &self.source {
            EventSource::Thing {
                thing_id,
                event_type_id,
            } => &event.thing_id == thing_id && &event.event_type_id == event_type_id,
            EventSource::Interface {
                interface,
                event: event_name,
            } => {
                registry
                    .thing_interfaces(&event.thing_id)
                    .iter()
                    .any(|i| i == interface)
                    && registry
                        .event_type_name(&event.thing_id, &event.event_type_id)
                        .as_deref()
                        == Some(event_name.as_str())
            }
        };

        if !source_matches {
            return false;
        }

        let Some(param) = &self.param else {
            return true;
        };

        let param_type_id = match &param.param {
            ParamRef::Id(id) => Some(*id),
            ParamRef::Name(name) => {
                registry.event_param_type_id(&event.thing_id, &event.event_type_id, name)
            }
        };

        let matching = param_type_id
            .and_then(|id| event.param(&id))
            .map(|actual| compare(actual, param.operator, &param.value))
            .unwrap_or(false);

        trace!(param = %param.param, matching, "Evaluated event param");
        matching
    }

    /// Check the descriptor against the registry
    pub fn validate(&self, registry: &dyn ThingRegistry) -> Result<(), String> {
        match &self.source {
            EventSource::Thing {
                thing_id,
                event_type_id,
            } => {
                if !registry.thing_exists(thing_id) {
                    return Err(format!("thing {} not found", thing_id));
                }
                if !registry.thing_has_event(thing_id, event_type_id) {
                    return Err(format!("thing {} has no event {}", thing_id, event_type_id));
                }
                if let Some(ParamDescriptor {
                    param: ParamRef::Name(name),
                    ..
                }) = &self.param
                {
                    if registry
                        .event_param_type_id(thing_id, event_type_id, name)
                        .is_none()
                    {
                        return Err(format!("event {} has no param {}", event_type_id, name));
                    }
                }
                Ok(())
            }
            EventSource::Interface { interface, event } => {
                if registry.interface_declares_event(interface, event) {
                    Ok(())
                } else {
                    Err(format!("interface {} has no event {}", interface, event))
                }
            }
        }
    }

    pub fn is_valid(&self, registry: &dyn ThingRegistry) -> bool {
        self.validate(registry).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Home;
    use hub_core::ParamList;

    #[test]
    fn test_thing_source() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let other = home.add_lamp("Hall");
        let descriptor = EventDescriptor::for_thing(lamp, home.pressed);

        let event = Event::new(home.pressed, lamp, ParamList::new());
        assert!(descriptor.matches(&event, home.registry()));

        let elsewhere = Event::new(home.pressed, other, ParamList::new());
        assert!(!descriptor.matches(&elsewhere, home.registry()));
    }

    #[test]
    fn test_param_constraint() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let descriptor = EventDescriptor::for_thing(lamp, home.pressed).with_param(
            ParamDescriptor::new(home.button, ValueOperator::GreaterOrEqual, 2),
        );

        let first = Event::new(home.pressed, lamp, ParamList::new().with(home.button, 1));
        let second = Event::new(home.pressed, lamp, ParamList::new().with(home.button, 2));
        let missing = Event::new(home.pressed, lamp, ParamList::new());

        assert!(!descriptor.matches(&first, home.registry()));
        assert!(descriptor.matches(&second, home.registry()));
        assert!(!descriptor.matches(&missing, home.registry()));
    }

    #[test]
    fn test_interface_source_by_name() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let sensor = home.add_sensor("Outside");
        let descriptor = EventDescriptor::for_interface("light", "pressed")
            .with_param(ParamDescriptor::new("button", ValueOperator::Equals, 3));

        let pressed = Event::new(home.pressed, lamp, ParamList::new().with(home.button, 3));
        assert!(descriptor.matches(&pressed, home.registry()));

        let from_sensor = Event::new(home.pressed, sensor, ParamList::new().with(home.button, 3));
        assert!(!descriptor.matches(&from_sensor, home.registry()));
    }

    #[test]
    fn test_interface_state_change_event() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let descriptor = EventDescriptor::for_interface("light", "power");

        let event = Event::state_changed(lamp, home.power, Value::Bool(true));
        assert!(descriptor.matches(&event, home.registry()));
        assert!(descriptor.is_valid(home.registry()));
    }

    #[test]
    fn test_validate() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");

        assert!(EventDescriptor::for_thing(lamp, home.pressed).is_valid(home.registry()));
        assert!(!EventDescriptor::for_thing(lamp, EventTypeId::new()).is_valid(home.registry()));
        assert!(!EventDescriptor::for_thing(ThingId::new(), home.pressed).is_valid(home.registry()));
        assert!(!EventDescriptor::for_interface("light", "dimmed").is_valid(home.registry()));
        assert!(EventDescriptor::for_thing(lamp, home.pressed)
            .with_param(ParamDescriptor::new("volume", ValueOperator::Equals, 1))
            .validate(home.registry())
            .is_err());
    }
}
