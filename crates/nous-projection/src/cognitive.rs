//! Memory contents and reasoning traces.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nous_protocol::{DomainEvent, EventEnvelope, EventId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::projection::{Projection, decode_event};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub value: Value,
    pub value_type: String,
    pub content_type: Option<String>,
    pub provider_id: Option<String>,
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub kind: String,
    pub error_type: String,
    pub message: String,
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLink {
    pub source_key: String,
    pub target_key: String,
    pub relation: String,
    pub event_id: EventId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitiveState {
    pub memory_entries: BTreeMap<String, MemoryEntry>,
    pub reasoning_traces: Vec<ReasoningTrace>,
    pub links: Vec<MemoryLink>,
    pub write_count: u64,
    pub delete_count: u64,
}

/// Accumulates memory writes, deletions, links and error traces.
///
/// Timestamps come from the envelopes, never from the clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct CognitiveProjection;

impl Projection for CognitiveProjection {
    type State = CognitiveState;

    fn initial_state(&self) -> CognitiveState {
        CognitiveState::default()
    }

    fn apply(&self, state: &mut CognitiveState, envelope: &EventEnvelope) {
        let Some(event) = decode_event(envelope) else {
            return;
        };
        match event {
            DomainEvent::MemoryWritten(e) => {
                state.memory_entries.insert(
                    e.key,
                    MemoryEntry {
                        value: e.value,
                        value_type: e.value_type,
                        content_type: e.content_type,
                        provider_id: e.provider_id,
                        event_id: envelope.event_id.clone(),
                        timestamp: envelope.timestamp,
                    },
                );
                state.write_count += 1;
            }
            DomainEvent::MemoryDeleted(e) => {
                if state.memory_entries.remove(&e.key).is_some() {
                    state.delete_count += 1;
                }
            }
            DomainEvent::MemoryLinked(e) => state.links.push(MemoryLink {
                source_key: e.source_key,
                target_key: e.target_key,
                relation: e.relation,
                event_id: envelope.event_id.clone(),
            }),
            DomainEvent::ErrorOccurred(e) => state.reasoning_traces.push(ReasoningTrace {
                kind: "error".to_owned(),
                error_type: e.error_type,
                message: e.message,
                event_id: envelope.event_id.clone(),
                timestamp: envelope.timestamp,
            }),
            _ => {}
        }
    }
}
