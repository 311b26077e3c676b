//! Opaque 128-bit identifiers
//!
//! Every identifier is a newtype over a [`Uuid`]. The nil uuid is the "unset"
//! sentinel and is reported by `is_null()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for unparsable identifiers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind}: '{input}'")]
pub struct IdError {
    pub kind: &'static str,
    pub input: String,
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The unset identifier
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Wrap an existing uuid
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying uuid
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Whether this is the unset sentinel
            pub fn is_null(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim_matches(|c| c == '{' || c == '}');
                Uuid::parse_str(trimmed).map(Self).map_err(|_| IdError {
                    kind: $kind,
                    input: s.to_string(),
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Identifies a configured thing (device or service instance)
    ThingId,
    "thing id"
);
define_id!(
    /// Identifies a thing class
    ThingClassId,
    "thing class id"
);
define_id!(
    /// Identifies a state type within a thing class
    StateTypeId,
    "state type id"
);
define_id!(
    /// Identifies an event type within a thing class
    EventTypeId,
    "event type id"
);
define_id!(
    /// Identifies an action type within a thing class
    ActionTypeId,
    "action type id"
);
define_id!(
    /// Identifies a parameter type of an event or action
    ParamTypeId,
    "param type id"
);
define_id!(
    /// Identifies a rule
    RuleId,
    "rule id"
);

impl From<StateTypeId> for EventTypeId {
    /// State-change events share the id of the state they report.
    fn from(id: StateTypeId) -> Self {
        Self(id.0)
    }
}

impl From<StateTypeId> for ParamTypeId {
    /// The single param of a state-change event shares the id of its state.
    fn from(id: StateTypeId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_is_null() {
        assert!(ThingId::nil().is_null());
        assert!(ThingId::default().is_null());
        assert!(!ThingId::new().is_null());
    }

    #[test]
    fn test_display_roundtrip() {
        let id = RuleId::new();
        let parsed: RuleId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_braced() {
        let id: ThingId = "{e5a6c4b1-7f0e-4f5d-9d7a-0d2b1c3e4f50}".parse().unwrap();
        assert_eq!(id.to_string(), "e5a6c4b1-7f0e-4f5d-9d7a-0d2b1c3e4f50");
    }

    #[test]
    fn test_parse_invalid() {
        let err = "not-a-uuid".parse::<StateTypeId>().unwrap_err();
        assert_eq!(err.kind, "state type id");
    }

    #[test]
    fn test_state_event_id_share_uuid() {
        let state = StateTypeId::new();
        let event: EventTypeId = state.into();
        assert_eq!(event.as_uuid(), state.as_uuid());
    }
}
