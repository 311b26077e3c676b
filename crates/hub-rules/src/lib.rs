//! Rule engine for the hub
//!
//! Rules react to thing events and to changes of thing state.
//!
//! ```text
//! RULE = TRIGGER EVENTS → CONDITION TREE → ACTIONS / EXIT ACTIONS
//! ```
//!
//! - **Triggers**: [`EventDescriptor`]s; any match triggers the rule
//! - **Condition**: a [`StateEvaluator`] tree of [`StateDescriptor`]s
//! - **Actions**: [`RuleAction`] templates, fired when the rule becomes
//!   active; exit actions fire when it becomes inactive
//!
//! # Key Types
//!
//! - [`Rule`] - Complete rule definition
//! - [`RuleEngine`] - Owns all rules and runs the activation state machine
//! - [`RuleRunner`] - Feeds bus events and periodic sweeps to the engine
//! - [`RuleStorage`] - Persistence of rules

pub mod engine;
pub mod error;
pub mod event_descriptor;
pub mod notification;
pub mod rule;
pub mod rule_action;
pub mod runner;
pub mod state_descriptor;
pub mod state_evaluator;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use engine::{RemovePolicy, RuleEngine, SharedRuleEngine};
pub use error::{ActionError, RuleError, RuleResult};
pub use event_descriptor::{EventDescriptor, EventSource, ParamDescriptor, ParamRef};
pub use notification::{RuleLogEntry, RuleLogKind, RuleNotification};
pub use rule::Rule;
pub use rule_action::{ParamSource, RuleAction, RuleActionParam, RuleActionTarget};
pub use runner::RuleRunner;
pub use state_descriptor::{StateDescriptor, StateTarget};
pub use state_evaluator::StateEvaluator;
pub use storage::{
    JsonRuleStorage, MemoryRuleStorage, RuleStorage, StorageError, StorageFile, StorageResult,
};
