//! Typed identifiers.
//!
//! IDs are opaque String wrappers (serde-transparent). Freshly generated ids
//! are UUIDv7 so that they sort by creation time; any externally supplied
//! string is accepted as-is.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new time-sortable ID (UUIDv7).
            pub fn generate() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::generate()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Unique identifier for an event envelope.
    EventId
);
typed_id!(
    /// Identifier of a producing agent.
    AgentId
);
typed_id!(
    /// Unique identifier for one running instance of an agent.
    InstanceId
);
typed_id!(
    /// Trace identifier shared by every hop of a causal chain.
    TraceId
);
typed_id!(
    /// Identifier of a single hop within a trace.
    SpanId
);
typed_id!(
    /// Groups the events of one logical flow.
    CorrelationId
);
typed_id!(
    /// Unique identifier for a registered tool.
    ToolId
);
typed_id!(
    /// Unique identifier for a checkpoint.
    CheckpointId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_ids_sort_by_creation() {
        let ids: Vec<EventId> = (0..64).map(|_| EventId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn typed_id_serde_is_transparent() {
        let id = AgentId::from_string("agent-A");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"agent-A\"");
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn typed_id_from_str_and_display() {
        let id: CorrelationId = "flow-1".into();
        assert_eq!(id.as_str(), "flow-1");
        assert_eq!(id.to_string(), "flow-1");
    }
}
