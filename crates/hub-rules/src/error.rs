//! Rule engine errors

use hub_core::{ActionTypeId, EventTypeId, ParamTypeId, RuleId, StateTypeId, ThingClassId, ThingId};
use hub_things::ThingError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors returned by the rule mutation API
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("Rule already exists: {0}")]
    DuplicateRuleId(RuleId),

    #[error("Invalid state evaluator: {0}")]
    InvalidStateEvaluator(String),

    #[error("Invalid event descriptor: {0}")]
    InvalidEventDescriptor(String),

    #[error("Invalid rule action: {0}")]
    InvalidRuleAction(String),

    #[error("Invalid rule format: {0}")]
    InvalidRuleFormat(String),

    #[error("Rule {0} has actions that need a trigger event")]
    ContainsEventBasedAction(RuleId),

    #[error("Rule is not executable: {0}")]
    RuleNotExecutable(RuleId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Reasons a rule action could not be turned into a concrete action
///
/// These never fail a rule; the action is skipped and the reason logged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("Action needs a trigger event but none is available")]
    NoTriggerEvent,

    #[error("Trigger event {event_type_id} has no param {param_type_id}")]
    EventParamMissing {
        event_type_id: EventTypeId,
        param_type_id: ParamTypeId,
    },

    #[error("State {state_type_id} of thing {thing_id} is not available")]
    StateUnavailable {
        thing_id: ThingId,
        state_type_id: StateTypeId,
    },

    #[error("Thing not found: {0}")]
    ThingNotFound(ThingId),

    #[error("Thing class not found: {0}")]
    DeviceClassNotFound(ThingClassId),

    #[error("Thing {thing_id} has no action {action}")]
    ActionTypeNotFound { thing_id: ThingId, action: String },

    #[error("Action {action_type_id} has no param {param}")]
    ParamNotFound {
        action_type_id: ActionTypeId,
        param: String,
    },

    #[error("No thing implements interface {0}")]
    NoImplementingThings(String),

    #[error("Thing error: {0}")]
    Thing(ThingError),
}

impl From<ThingError> for ActionError {
    fn from(err: ThingError) -> Self {
        match err {
            ThingError::ThingNotFound(id) => ActionError::ThingNotFound(id),
            ThingError::ThingClassNotFound(id) => ActionError::DeviceClassNotFound(id),
            ThingError::ActionTypeNotFound { thing_id, action } => {
                ActionError::ActionTypeNotFound { thing_id, action }
            }
            other => ActionError::Thing(other),
        }
    }
}
