//! Index of memory writes, a placeholder for vector indexing.

use nous_protocol::{DomainEvent, EventEnvelope, EventId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::projection::{Projection, decode_event};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub value: Value,
    pub event_id: EventId,
}

/// `count` is the number of live entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticState {
    pub index_entries: Vec<IndexEntry>,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticProjection;

impl Projection for SemanticProjection {
    type State = SemanticState;

    fn initial_state(&self) -> SemanticState {
        SemanticState::default()
    }

    fn apply(&self, state: &mut SemanticState, envelope: &EventEnvelope) {
        match decode_event(envelope) {
            Some(DomainEvent::MemoryWritten(e)) => {
                state.index_entries.push(IndexEntry {
                    key: e.key,
                    value: e.value,
                    event_id: envelope.event_id.clone(),
                });
            }
            Some(DomainEvent::MemoryDeleted(e)) => {
                state.index_entries.retain(|entry| entry.key != e.key);
            }
            _ => return,
        }
        state.count = state.index_entries.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::envelope;
    use nous_protocol::{MemoryDeleted, MemoryWritten};
    use serde_json::json;

    #[test]
    fn deletes_drop_every_entry_for_the_key() {
        let write = |key: &str| {
            envelope(MemoryWritten {
                key: key.into(),
                value_type: "text".into(),
                value: json!(key),
                content_type: Some("text/plain".into()),
                provider_id: None,
            })
        };
        let events = vec![
            write("a"),
            write("b"),
            write("a"),
            envelope(MemoryDeleted {
                key: "a".into(),
                provider_id: String::new(),
            }),
        ];
        let state = SemanticProjection.fold(&events);
        assert_eq!(state.count, 1);
        assert_eq!(state.index_entries[0].key, "b");
    }
}
