//! Action templates of a rule
//!
//! A [`RuleAction`] names an action of a thing (or of every thing implementing
//! an interface) and how to obtain each param value at fire time: a literal,
//! a param of the triggering event, or the current value of some state.

use hub_core::{
    Action, ActionTypeId, Context, Event, EventTypeId, Param, ParamList, ParamTypeId, RuleId,
    StateTypeId, ThingId, Value,
};
use hub_things::{ActionType, ThingRegistry};
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::event_descriptor::ParamRef;

/// Which action to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleActionTarget {
    Thing {
        thing_id: ThingId,
        action_type_id: ActionTypeId,
    },
    /// The named action on every implementing thing
    Interface { interface: String, action: String },
}

/// Where a param value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamSource {
    Value { value: Value },
    EventParam {
        event_type_id: EventTypeId,
        param_type_id: ParamTypeId,
    },
    State {
        thing_id: ThingId,
        state_type_id: StateTypeId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleActionParam {
    pub param: ParamRef,
    pub source: ParamSource,
}

impl RuleActionParam {
    pub fn value(param: impl Into<ParamRef>, value: impl Into<Value>) -> Self {
        Self {
            param: param.into(),
            source: ParamSource::Value {
                value: value.into(),
            },
        }
    }

    /// Take the value from a param of the triggering event
    pub fn event_param(
        param: impl Into<ParamRef>,
        event_type_id: EventTypeId,
        param_type_id: ParamTypeId,
    ) -> Self {
        Self {
            param: param.into(),
            source: ParamSource::EventParam {
                event_type_id,
                param_type_id,
            },
        }
    }

    /// Take the value from the current state of a thing
    pub fn state(param: impl Into<ParamRef>, thing_id: ThingId, state_type_id: StateTypeId) -> Self {
        Self {
            param: param.into(),
            source: ParamSource::State {
                thing_id,
                state_type_id,
            },
        }
    }

    pub fn is_event_based(&self) -> bool {
        matches!(self.source, ParamSource::EventParam { .. })
    }

    fn resolve_value(
        &self,
        trigger: Option<&Event>,
        registry: &dyn ThingRegistry,
    ) -> Result<Value, ActionError> {
        match &self.source {
            ParamSource::Value { value } => Ok(value.clone()),
            ParamSource::EventParam {
                event_type_id,
                param_type_id,
            } => {
                let event = trigger.ok_or(ActionError::NoTriggerEvent)?;
                if &event.event_type_id != event_type_id {
                    return Err(ActionError::EventParamMissing {
                        event_type_id: *event_type_id,
                        param_type_id: *param_type_id,
                    });
                }
                event
                    .param(param_type_id)
                    .cloned()
                    .ok_or(ActionError::EventParamMissing {
                        event_type_id: *event_type_id,
                        param_type_id: *param_type_id,
                    })
            }
            ParamSource::State {
                thing_id,
                state_type_id,
            } => registry
                .current_state_value(thing_id, state_type_id)
                .ok_or(ActionError::StateUnavailable {
                    thing_id: *thing_id,
                    state_type_id: *state_type_id,
                }),
        }
    }
}

/// An action template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    pub target: RuleActionTarget,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<RuleActionParam>,
}

impl RuleAction {
    pub fn for_thing(thing_id: ThingId, action_type_id: ActionTypeId) -> Self {
        Self {
            target: RuleActionTarget::Thing {
                thing_id,
                action_type_id,
            },
            params: Vec::new(),
        }
    }

    pub fn for_interface(interface: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: RuleActionTarget::Interface {
                interface: interface.into(),
                action: action.into(),
            },
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: RuleActionParam) -> Self {
        self.params.push(param);
        self
    }

    /// Whether any param needs a trigger event
    pub fn is_event_based(&self) -> bool {
        self.params.iter().any(RuleActionParam::is_event_based)
    }

    /// Event types whose params this action reads
    pub fn event_types(&self) -> impl Iterator<Item = EventTypeId> + '_ {
        self.params.iter().filter_map(|p| match p.source {
            ParamSource::EventParam { event_type_id, .. } => Some(event_type_id),
            _ => None,
        })
    }

    /// The target thing, for thing-based actions
    pub fn thing_id(&self) -> Option<ThingId> {
        match &self.target {
            RuleActionTarget::Thing { thing_id, .. } => Some(*thing_id),
            RuleActionTarget::Interface { .. } => None,
        }
    }

    /// Whether the action targets the thing or reads one of its states
    pub fn references_thing(&self, thing_id: &ThingId) -> bool {
        self.thing_id().as_ref() == Some(thing_id)
            || self.params.iter().any(|p| {
                matches!(&p.source, ParamSource::State { thing_id: id, .. } if id == thing_id)
            })
    }

    /// Check the template against the registry
    pub fn validate(&self, registry: &dyn ThingRegistry) -> Result<(), String> {
        match &self.target {
            RuleActionTarget::Thing {
                thing_id,
                action_type_id,
            } => {
                let action_type = registry
                    .action_type(thing_id, action_type_id)
                    .map_err(|e| e.to_string())?;

                for param in &self.params {
                    let param_type = match &param.param {
                        ParamRef::Id(id) => action_type.param_type(id),
                        ParamRef::Name(name) => action_type.param_type_by_name(name),
                    }
                    .ok_or_else(|| {
                        format!("action {} has no param {}", action_type.name, param.param)
                    })?;

                    if let ParamSource::Value { value } = &param.source {
                        param_type
                            .constraints()
                            .check(value)
                            .map_err(|reason| format!("param {}: {}", param_type.name, reason))?;
                    }
                }
            }
            RuleActionTarget::Interface { interface, action } => {
                if !registry.interface_declares_action(interface, action) {
                    return Err(format!("interface {} has no action {}", interface, action));
                }
            }
        }

        for param in &self.params {
            if let ParamSource::State {
                thing_id,
                state_type_id,
            } = &param.source
            {
                if !registry.thing_has_state(thing_id, state_type_id) {
                    return Err(format!("thing {} has no state {}", thing_id, state_type_id));
                }
            }
        }
        Ok(())
    }

    /// Turn the template into concrete actions
    ///
    /// Interface actions yield one action per implementing thing whose class
    /// declares an action of that name.
    pub fn resolve(
        &self,
        trigger: Option<&Event>,
        registry: &dyn ThingRegistry,
        rule_id: RuleId,
    ) -> Result<Vec<Action>, ActionError> {
        let targets: Vec<(ThingId, ActionType)> = match &self.target {
            RuleActionTarget::Thing {
                thing_id,
                action_type_id,
            } => vec![(*thing_id, registry.action_type(thing_id, action_type_id)?)],
            RuleActionTarget::Interface { interface, action } => {
                let targets: Vec<_> = registry
                    .things_implementing(interface)
                    .into_iter()
                    .filter_map(|thing_id| {
                        registry
                            .action_type_by_name(&thing_id, action)
                            .ok()
                            .map(|action_type| (thing_id, action_type))
                    })
                    .collect();
                if targets.is_empty() {
                    return Err(ActionError::NoImplementingThings(interface.clone()));
                }
                targets
            }
        };

        let context = Context::for_rule(rule_id, trigger.map(|e| &e.context));
        targets
            .into_iter()
            .map(|(thing_id, action_type)| {
                let params = self.resolve_params(&action_type, trigger, registry)?;
                Ok(Action::new(action_type.id, thing_id, params).with_context(context.clone()))
            })
            .collect()
    }

    fn resolve_params(
        &self,
        action_type: &ActionType,
        trigger: Option<&Event>,
        registry: &dyn ThingRegistry,
    ) -> Result<ParamList, ActionError> {
        let mut params = ParamList::new();
        for param in &self.params {
            let param_type_id = match &param.param {
                ParamRef::Id(id) => *id,
                ParamRef::Name(name) => action_type
                    .param_type_by_name(name)
                    .map(|p| p.id)
                    .ok_or_else(|| ActionError::ParamNotFound {
                        action_type_id: action_type.id,
                        param: name.clone(),
                    })?,
            };
            params.set(Param::new(param_type_id, param.resolve_value(trigger, registry)?));
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Home;

    #[test]
    fn test_literal_params() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let rule_id = RuleId::new();
        let template = RuleAction::for_thing(lamp, home.set_power)
            .with_param(RuleActionParam::value(home.power_param, true));

        let actions = template.resolve(None, home.registry(), rule_id).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].thing_id, lamp);
        assert_eq!(actions[0].params.get(&home.power_param), Some(&Value::Bool(true)));
        assert_eq!(actions[0].context.rule_id, Some(rule_id));
    }

    #[test]
    fn test_event_param_binding() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let template = RuleAction::for_thing(lamp, home.set_brightness).with_param(
            RuleActionParam::event_param(home.brightness_param, home.pressed, home.button),
        );

        let event = Event::new(home.pressed, lamp, ParamList::new().with(home.button, 42));
        let actions = template
            .resolve(Some(&event), home.registry(), RuleId::new())
            .unwrap();
        assert_eq!(actions[0].params.get(&home.brightness_param), Some(&Value::Int(42)));
        assert_eq!(actions[0].context.parent_id.as_ref(), Some(&event.context.id));

        assert_eq!(
            template.resolve(None, home.registry(), RuleId::new()),
            Err(ActionError::NoTriggerEvent)
        );

        let without_param = Event::new(home.pressed, lamp, ParamList::new());
        assert!(matches!(
            template.resolve(Some(&without_param), home.registry(), RuleId::new()),
            Err(ActionError::EventParamMissing { .. })
        ));
    }

    #[test]
    fn test_state_param_reads_current_value() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let other = home.add_lamp("Hall");
        home.things.set_state_value(&other, &home.brightness, 70).unwrap();

        let template = RuleAction::for_thing(lamp, home.set_brightness).with_param(
            RuleActionParam::state(home.brightness_param, other, home.brightness),
        );
        let actions = template.resolve(None, home.registry(), RuleId::new()).unwrap();
        assert_eq!(actions[0].params.get(&home.brightness_param), Some(&Value::Int(70)));

        home.things.remove_thing(&other);
        assert!(matches!(
            template.resolve(None, home.registry(), RuleId::new()),
            Err(ActionError::StateUnavailable { .. })
        ));
    }

    #[test]
    fn test_interface_action_fans_out() {
        let home = Home::new();
        let a = home.add_lamp("A");
        let b = home.add_lamp("B");
        home.add_sensor("Outside");

        let template = RuleAction::for_interface("light", "power")
            .with_param(RuleActionParam::value("power", false));
        let actions = template.resolve(None, home.registry(), RuleId::new()).unwrap();

        let mut targets: Vec<_> = actions.iter().map(|a| a.thing_id).collect();
        targets.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(targets, expected);
        assert!(actions
            .iter()
            .all(|a| a.params.get(&home.power_param) == Some(&Value::Bool(false))));
    }

    #[test]
    fn test_interface_without_things() {
        let home = Home::new();
        let template = RuleAction::for_interface("light", "power");
        assert_eq!(
            template.resolve(None, home.registry(), RuleId::new()),
            Err(ActionError::NoImplementingThings("light".to_string()))
        );
    }

    #[test]
    fn test_validate() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");

        let valid = RuleAction::for_thing(lamp, home.set_brightness)
            .with_param(RuleActionParam::value(home.brightness_param, 50));
        let out_of_range = RuleAction::for_thing(lamp, home.set_brightness)
            .with_param(RuleActionParam::value(home.brightness_param, 500));
        let unknown_param = RuleAction::for_thing(lamp, home.set_power)
            .with_param(RuleActionParam::value("color", "red"));

        assert!(valid.validate(home.registry()).is_ok());
        assert!(out_of_range.validate(home.registry()).is_err());
        assert!(unknown_param.validate(home.registry()).is_err());
        assert!(RuleAction::for_thing(ThingId::new(), home.set_power)
            .validate(home.registry())
            .is_err());
        assert!(RuleAction::for_interface("light", "dim")
            .validate(home.registry())
            .is_err());
    }
}
