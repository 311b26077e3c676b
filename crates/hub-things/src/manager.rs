//! In-memory thing manager
//!
//! Holds thing classes, interfaces and configured things, tracks live state
//! values and fires a state-change event on the bus whenever a value changes.

use async_trait::async_trait;
use dashmap::DashMap;
use hub_core::{
    Action, ActionTypeId, Event, EventTypeId, Param, ParamList, ParamTypeId, StateTypeId,
    ThingClassId, ThingId, Value,
};
use hub_event_bus::EventBus;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::executor::{ActionExecutor, ActionFuture, ActionHandler, ExecutionStatus};
use crate::registry::{ThingError, ThingRegistry, ThingResult};
use crate::types::{ActionType, Interface, Thing, ThingClass, ValueConstraints};

/// The in-memory thing registry
pub struct ThingManager {
    classes: DashMap<ThingClassId, ThingClass>,
    interfaces: DashMap<String, Interface>,
    things: DashMap<ThingId, Thing>,
    /// Action handlers by thing class
    handlers: DashMap<ThingClassId, ActionHandler>,
    event_bus: Arc<EventBus>,
}

impl ThingManager {
    /// Create an empty manager publishing on the given bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            classes: DashMap::new(),
            interfaces: DashMap::new(),
            things: DashMap::new(),
            handlers: DashMap::new(),
            event_bus,
        }
    }

    /// Register an interface
    pub fn add_interface(&self, interface: Interface) {
        debug!(interface = %interface.name, "Registering interface");
        self.interfaces.insert(interface.name.clone(), interface);
    }

    /// Register a thing class
    pub fn add_thing_class(&self, thing_class: ThingClass) {
        debug!(class = %thing_class.name, id = %thing_class.id, "Registering thing class");
        self.classes.insert(thing_class.id, thing_class);
    }

    pub fn thing_class(&self, id: &ThingClassId) -> Option<ThingClass> {
        self.classes.get(id).map(|c| c.clone())
    }

    /// Configure a new thing with a fresh id
    pub fn add_thing(
        &self,
        name: impl Into<String>,
        thing_class_id: ThingClassId,
    ) -> ThingResult<ThingId> {
        self.add_thing_with_id(ThingId::new(), name, thing_class_id)
    }

    /// Configure a new thing
    ///
    /// All states start at the default value declared by the class.
    #[instrument(skip(self, name))]
    pub fn add_thing_with_id(
        &self,
        thing_id: ThingId,
        name: impl Into<String>,
        thing_class_id: ThingClassId,
    ) -> ThingResult<ThingId> {
        if self.things.contains_key(&thing_id) {
            return Err(ThingError::DuplicateThing(thing_id));
        }

        let states: HashMap<StateTypeId, Value> = self
            .classes
            .get(&thing_class_id)
            .ok_or(ThingError::ThingClassNotFound(thing_class_id))?
            .state_types
            .iter()
            .map(|s| (s.id, s.default_value.clone()))
            .collect();

        let thing = Thing {
            id: thing_id,
            name: name.into(),
            thing_class_id,
            states,
            available: true,
        };

        info!(name = %thing.name, "Added thing");
        self.things.insert(thing_id, thing);
        Ok(thing_id)
    }

    /// Remove a configured thing
    pub fn remove_thing(&self, thing_id: &ThingId) -> Option<Thing> {
        let removed = self.things.remove(thing_id).map(|(_, t)| t);
        if let Some(thing) = &removed {
            info!(name = %thing.name, %thing_id, "Removed thing");
        }
        removed
    }

    pub fn thing(&self, thing_id: &ThingId) -> Option<Thing> {
        self.things.get(thing_id).map(|t| t.clone())
    }

    pub fn things(&self) -> Vec<Thing> {
        self.things.iter().map(|t| t.value().clone()).collect()
    }

    pub fn thing_count(&self) -> usize {
        self.things.len()
    }

    /// Update a state value reported by an integration
    ///
    /// The value is converted to the declared state type. Fires a
    /// state-change event only if the value actually changed; returns whether
    /// it did.
    #[instrument(skip(self, value))]
    pub fn set_state_value(
        &self,
        thing_id: &ThingId,
        state_type_id: &StateTypeId,
        value: impl Into<Value>,
    ) -> ThingResult<bool> {
        let value = value.into();
        let value_type = self
            .with_class(thing_id, |_, class| {
                class.state_type(state_type_id).map(|s| s.value_type)
            })
            .ok_or(ThingError::ThingNotFound(*thing_id))?
            .ok_or(ThingError::StateTypeNotFound {
                thing_id: *thing_id,
                state_type_id: *state_type_id,
            })?;

        let converted = value.convert(value_type).ok_or_else(|| {
            ThingError::InvalidParameter(format!("cannot convert {} to {}", value, value_type))
        })?;

        let changed = {
            let mut thing = self
                .things
                .get_mut(thing_id)
                .ok_or(ThingError::ThingNotFound(*thing_id))?;
            let previous = thing.states.insert(*state_type_id, converted.clone());
            previous.as_ref() != Some(&converted)
        };

        if changed {
            debug!(value = %converted, "State changed");
            self.event_bus
                .fire(Event::state_changed(*thing_id, *state_type_id, converted));
        }

        Ok(changed)
    }

    /// Mark the hardware behind a thing as reachable or not
    pub fn set_available(&self, thing_id: &ThingId, available: bool) -> ThingResult<()> {
        let mut thing = self
            .things
            .get_mut(thing_id)
            .ok_or(ThingError::ThingNotFound(*thing_id))?;
        thing.available = available;
        Ok(())
    }

    /// Emit an event of a thing onto the bus
    pub fn emit_event(
        &self,
        thing_id: &ThingId,
        event_type_id: &EventTypeId,
        params: ParamList,
    ) -> ThingResult<Event> {
        if !self.thing_exists(thing_id) {
            return Err(ThingError::ThingNotFound(*thing_id));
        }
        if !self.thing_has_event(thing_id, event_type_id) {
            return Err(ThingError::EventTypeNotFound {
                thing_id: *thing_id,
                event_type_id: *event_type_id,
            });
        }

        let event = Event::new(*event_type_id, *thing_id, params);
        self.event_bus.fire(event.clone());
        Ok(event)
    }

    /// Register the integration callback for actions of a thing class
    pub fn register_action_handler<F, Fut>(&self, thing_class_id: ThingClassId, handler: F)
    where
        F: Fn(Action) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ThingResult<ExecutionStatus>> + Send + 'static,
    {
        debug!(%thing_class_id, "Registering action handler");
        let handler: ActionHandler =
            Arc::new(move |action: Action| -> ActionFuture { Box::pin(handler(action)) });
        self.handlers.insert(thing_class_id, handler);
    }

    fn with_class<R>(&self, thing_id: &ThingId, f: impl FnOnce(&Thing, &ThingClass) -> R) -> Option<R> {
        let thing = self.things.get(thing_id)?;
        let class = self.classes.get(&thing.thing_class_id)?;
        Some(f(&thing, &class))
    }

    /// Fill in defaults and convert every param to its declared type
    fn check_action_params(action_type: &ActionType, params: ParamList) -> ThingResult<ParamList> {
        if let Some(unknown) = params
            .iter()
            .find(|p| action_type.param_type(&p.param_type_id).is_none())
        {
            return Err(ThingError::InvalidParameter(format!(
                "action {} has no param {}",
                action_type.name, unknown.param_type_id
            )));
        }

        let mut checked = ParamList::new();
        for param_type in &action_type.param_types {
            let value = params
                .get(&param_type.id)
                .cloned()
                .or_else(|| param_type.default_value.clone())
                .ok_or_else(|| {
                    ThingError::InvalidParameter(format!("missing param {}", param_type.name))
                })?;

            let converted = param_type
                .constraints()
                .check(&value)
                .map_err(|reason| ThingError::InvalidParameter(format!("{}: {}", param_type.name, reason)))?;
            checked.set(Param::new(param_type.id, converted));
        }
        Ok(checked)
    }
}

impl ThingRegistry for ThingManager {
    fn thing_exists(&self, thing_id: &ThingId) -> bool {
        self.things.contains_key(thing_id)
    }

    fn thing_has_state(&self, thing_id: &ThingId, state_type_id: &StateTypeId) -> bool {
        self.with_class(thing_id, |_, class| class.state_type(state_type_id).is_some())
            .unwrap_or(false)
    }

    fn current_state_value(
        &self,
        thing_id: &ThingId,
        state_type_id: &StateTypeId,
    ) -> Option<Value> {
        self.things
            .get(thing_id)
            .and_then(|t| t.state_value(state_type_id).cloned())
    }

    fn state_value_by_name(&self, thing_id: &ThingId, state_name: &str) -> Option<Value> {
        self.with_class(thing_id, |thing, class| {
            class
                .state_type_by_name(state_name)
                .and_then(|s| thing.state_value(&s.id).cloned())
        })
        .flatten()
    }

    fn things_implementing(&self, interface: &str) -> Vec<ThingId> {
        self.things
            .iter()
            .filter(|t| {
                self.classes
                    .get(&t.thing_class_id)
                    .map(|c| c.implements(interface))
                    .unwrap_or(false)
            })
            .map(|t| t.id)
            .collect()
    }

    fn thing_interfaces(&self, thing_id: &ThingId) -> Vec<String> {
        self.with_class(thing_id, |_, class| class.interfaces.clone())
            .unwrap_or_default()
    }

    fn interface_declares_state(&self, interface: &str, state_name: &str) -> bool {
        self.interfaces
            .get(interface)
            .map(|i| i.has_state(state_name))
            .unwrap_or(false)
    }

    fn interface_declares_event(&self, interface: &str, event_name: &str) -> bool {
        self.interfaces
            .get(interface)
            .map(|i| i.has_event(event_name))
            .unwrap_or(false)
    }

    fn interface_declares_action(&self, interface: &str, action_name: &str) -> bool {
        self.interfaces
            .get(interface)
            .map(|i| i.has_action(action_name))
            .unwrap_or(false)
    }

    fn state_type_constraints(
        &self,
        thing_id: &ThingId,
        state_type_id: &StateTypeId,
    ) -> Option<ValueConstraints> {
        self.with_class(thing_id, |_, class| {
            class.state_type(state_type_id).map(|s| s.constraints())
        })
        .flatten()
    }

    fn thing_has_event(&self, thing_id: &ThingId, event_type_id: &EventTypeId) -> bool {
        self.event_type_name(thing_id, event_type_id).is_some()
    }

    fn event_type_name(&self, thing_id: &ThingId, event_type_id: &EventTypeId) -> Option<String> {
        self.with_class(thing_id, |_, class| {
            class.event_name(event_type_id).map(str::to_string)
        })
        .flatten()
    }

    fn event_param_type_id(
        &self,
        thing_id: &ThingId,
        event_type_id: &EventTypeId,
        param_name: &str,
    ) -> Option<ParamTypeId> {
        self.with_class(thing_id, |_, class| {
            if let Some(event_type) = class.event_type(event_type_id) {
                return event_type
                    .param_types
                    .iter()
                    .find(|p| p.name == param_name)
                    .map(|p| p.id);
            }
            // A state-change event carries one param named like the state
            class
                .state_types
                .iter()
                .find(|s| s.id.as_uuid() == event_type_id.as_uuid() && s.name == param_name)
                .map(|s| ParamTypeId::from(s.id))
        })
        .flatten()
    }

    fn action_type(
        &self,
        thing_id: &ThingId,
        action_type_id: &ActionTypeId,
    ) -> ThingResult<ActionType> {
        let thing = self
            .things
            .get(thing_id)
            .ok_or(ThingError::ThingNotFound(*thing_id))?;
        let class = self
            .classes
            .get(&thing.thing_class_id)
            .ok_or(ThingError::ThingClassNotFound(thing.thing_class_id))?;
        class
            .action_type(action_type_id)
            .cloned()
            .ok_or_else(|| ThingError::ActionTypeNotFound {
                thing_id: *thing_id,
                action: action_type_id.to_string(),
            })
    }

    fn action_type_by_name(
        &self,
        thing_id: &ThingId,
        action_name: &str,
    ) -> ThingResult<ActionType> {
        let thing = self
            .things
            .get(thing_id)
            .ok_or(ThingError::ThingNotFound(*thing_id))?;
        let class = self
            .classes
            .get(&thing.thing_class_id)
            .ok_or(ThingError::ThingClassNotFound(thing.thing_class_id))?;
        class
            .action_type_by_name(action_name)
            .cloned()
            .ok_or_else(|| ThingError::ActionTypeNotFound {
                thing_id: *thing_id,
                action: action_name.to_string(),
            })
    }
}

#[async_trait]
impl ActionExecutor for ThingManager {
    #[instrument(skip(self, action), fields(thing_id = %action.thing_id, action_type_id = %action.action_type_id))]
    async fn execute_action(&self, action: Action) -> ThingResult<ExecutionStatus> {
        let (thing_class_id, available) = self
            .things
            .get(&action.thing_id)
            .map(|t| (t.thing_class_id, t.available))
            .ok_or(ThingError::ThingNotFound(action.thing_id))?;

        if !available {
            warn!("Hardware not available, rejecting action");
            return Err(ThingError::HardwareNotAvailable(action.thing_id));
        }

        let action_type = self.action_type(&action.thing_id, &action.action_type_id)?;
        let params = Self::check_action_params(&action_type, action.params)?;
        let action = Action { params, ..action };

        // Release the map guard before awaiting the handler
        let handler = self.handlers.get(&thing_class_id).map(|h| h.clone());
        match handler {
            Some(handler) => {
                debug!(action = %action_type.name, "Executing action");
                handler(action).await
            }
            None => {
                debug!(action = %action_type.name, "No handler registered, action accepted");
                Ok(ExecutionStatus::Completed)
            }
        }
    }
}

/// Thread-safe wrapper for ThingManager
pub type SharedThingManager = Arc<ThingManager>;
