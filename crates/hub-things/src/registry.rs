//! Query interface of the thing registry
//!
//! The rule engine never reaches into a global thing manager. It is handed an
//! `Arc<dyn ThingRegistry>` and asks it everything it needs to validate and
//! evaluate rules.

use hub_core::{ActionTypeId, EventTypeId, ParamTypeId, StateTypeId, ThingClassId, ThingId, Value};
use thiserror::Error;

use crate::types::{ActionType, ValueConstraints};

/// Errors reported by the registry and by action execution
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThingError {
    #[error("thing not found: {0}")]
    ThingNotFound(ThingId),

    #[error("thing class not found: {0}")]
    ThingClassNotFound(ThingClassId),

    #[error("thing {thing_id} has no action {action}")]
    ActionTypeNotFound { thing_id: ThingId, action: String },

    #[error("thing {thing_id} has no state {state_type_id}")]
    StateTypeNotFound {
        thing_id: ThingId,
        state_type_id: StateTypeId,
    },

    #[error("thing {thing_id} has no event {event_type_id}")]
    EventTypeNotFound {
        thing_id: ThingId,
        event_type_id: EventTypeId,
    },

    #[error("hardware not available for thing {0}")]
    HardwareNotAvailable(ThingId),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("thing already exists: {0}")]
    DuplicateThing(ThingId),
}

/// Result type for registry operations
pub type ThingResult<T> = Result<T, ThingError>;

/// Read access to configured things, their classes and interfaces
pub trait ThingRegistry: Send + Sync {
    /// Whether a thing with this id is configured
    fn thing_exists(&self, thing_id: &ThingId) -> bool;

    /// Whether the thing's class declares the state type
    fn thing_has_state(&self, thing_id: &ThingId, state_type_id: &StateTypeId) -> bool;

    /// Current value of a state
    fn current_state_value(&self, thing_id: &ThingId, state_type_id: &StateTypeId)
        -> Option<Value>;

    /// Current value of a state looked up by its name
    fn state_value_by_name(&self, thing_id: &ThingId, state_name: &str) -> Option<Value>;

    /// All things whose class implements the interface
    fn things_implementing(&self, interface: &str) -> Vec<ThingId>;

    /// Interfaces implemented by the thing's class
    fn thing_interfaces(&self, thing_id: &ThingId) -> Vec<String>;

    /// Whether a known interface declares a state of that name
    fn interface_declares_state(&self, interface: &str, state_name: &str) -> bool;

    /// Whether a known interface declares an event of that name
    fn interface_declares_event(&self, interface: &str, event_name: &str) -> bool;

    /// Whether a known interface declares an action of that name
    fn interface_declares_action(&self, interface: &str, action_name: &str) -> bool;

    /// Type, range and allowed values of a state
    fn state_type_constraints(
        &self,
        thing_id: &ThingId,
        state_type_id: &StateTypeId,
    ) -> Option<ValueConstraints>;

    /// Whether the thing's class declares the event type
    fn thing_has_event(&self, thing_id: &ThingId, event_type_id: &EventTypeId) -> bool;

    /// Name of an event type of the thing's class
    fn event_type_name(&self, thing_id: &ThingId, event_type_id: &EventTypeId) -> Option<String>;

    /// Resolve an event param name to its type id
    fn event_param_type_id(
        &self,
        thing_id: &ThingId,
        event_type_id: &EventTypeId,
        param_name: &str,
    ) -> Option<ParamTypeId>;

    /// Look up an action type of the thing's class
    fn action_type(
        &self,
        thing_id: &ThingId,
        action_type_id: &ActionTypeId,
    ) -> ThingResult<ActionType>;

    /// Look up an action type of the thing's class by name
    fn action_type_by_name(&self, thing_id: &ThingId, action_name: &str)
        -> ThingResult<ActionType>;
}
