//! Events emitted by things

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EventTypeId, Param, ParamList, ParamTypeId, StateTypeId, ThingId, Value};

/// An event emitted by a thing
///
/// Events are the input of the rule engine: every event is matched against
/// the event descriptors of all rules that reference its thing or one of the
/// interfaces the thing implements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Which event of the thing's class fired
    pub event_type_id: EventTypeId,

    /// The thing that emitted the event
    pub thing_id: ThingId,

    /// Event params
    #[serde(default)]
    pub params: ParamList,

    /// Whether this event reports a change of a state value
    #[serde(default)]
    pub state_change: bool,

    /// When the event was fired
    pub time_fired: DateTime<Utc>,

    /// Causality
    pub context: Context,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(event_type_id: EventTypeId, thing_id: ThingId, params: ParamList) -> Self {
        Self {
            event_type_id,
            thing_id,
            params,
            state_change: false,
            time_fired: Utc::now(),
            context: Context::new(),
        }
    }

    /// Create the event reporting a new state value
    ///
    /// The event type id and the id of its single param both equal the state
    /// type id.
    pub fn state_changed(thing_id: ThingId, state_type_id: StateTypeId, value: Value) -> Self {
        let params = ParamList::from(vec![Param::new(ParamTypeId::from(state_type_id), value)]);
        Self {
            state_change: true,
            ..Self::new(EventTypeId::from(state_type_id), thing_id, params)
        }
    }

    /// Replace the event context
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Look up a param value
    pub fn param(&self, param_type_id: &ParamTypeId) -> Option<&Value> {
        self.params.get(param_type_id)
    }
}
