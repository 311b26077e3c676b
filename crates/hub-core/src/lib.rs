//! Core types for the hub
//!
//! This crate provides the fundamental types shared by the thing registry and
//! the rule engine: typed identifiers, the dynamically typed [`Value`] with its
//! comparison operators, and the [`Event`] / [`Action`] messages that flow
//! between integrations and rules.

mod action;
mod context;
mod event;
mod ids;
mod param;
mod value;

pub use action::Action;
pub use context::Context;
pub use event::Event;
pub use ids::{
    ActionTypeId, EventTypeId, IdError, ParamTypeId, RuleId, StateTypeId, ThingClassId, ThingId,
};
pub use param::{Param, ParamList};
pub use value::{compare, StateOperator, Value, ValueOperator, ValueType};
