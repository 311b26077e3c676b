//! Thing registry for the hub
//!
//! Things are configured instances of a [`ThingClass`]. A class declares the
//! states, events and actions of its things and the interfaces it implements.
//! The rule engine only talks to this crate through the [`ThingRegistry`] and
//! [`ActionExecutor`] traits; [`ThingManager`] is the in-memory
//! implementation of both.

mod executor;
mod manager;
mod registry;
mod types;

pub use executor::{ActionExecutor, ActionFuture, ActionHandler, ExecutionStatus};
pub use manager::{SharedThingManager, ThingManager};
pub use registry::{ThingError, ThingRegistry, ThingResult};
pub use types::{
    ActionType, EventType, Interface, ParamType, StateType, Thing, ThingClass, ValueConstraints,
};
