//! Concrete action invocations

use serde::{Deserialize, Serialize};

use crate::{ActionTypeId, Context, ParamList, ThingId};

/// A fully resolved action, ready to be executed by the thing's integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Which action of the thing's class to run
    pub action_type_id: ActionTypeId,

    /// Target thing
    pub thing_id: ThingId,

    /// Resolved params
    #[serde(default)]
    pub params: ParamList,

    /// Causality
    pub context: Context,
}

impl Action {
    pub fn new(action_type_id: ActionTypeId, thing_id: ThingId, params: ParamList) -> Self {
        Self {
            action_type_id,
            thing_id,
            params,
            context: Context::new(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}
