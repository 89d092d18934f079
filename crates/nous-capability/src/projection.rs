use std::collections::BTreeSet;

use indexmap::IndexMap;
use nous_projection::{Projection, decode_event};
use nous_protocol::{Capability, CapabilityKey, DomainEvent, EventEnvelope, EventId};
use serde::{Deserialize, Serialize};

/// One registration: the descriptor plus the event that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    #[serde(flatten)]
    pub capability: Capability,
    pub event_id: EventId,
}

impl CapabilityEntry {
    pub fn key(&self) -> CapabilityKey {
        self.capability.key()
    }
}

/// Catalog in registration order plus the deprecated key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityState {
    pub capabilities: IndexMap<CapabilityKey, CapabilityEntry>,
    pub deprecated: BTreeSet<CapabilityKey>,
}

impl CapabilityState {
    pub fn is_active(&self, key: &CapabilityKey) -> bool {
        self.capabilities
            .get(key)
            .is_some_and(|entry| !entry.capability.deprecated && !self.deprecated.contains(key))
    }

    /// Registrations that are not deprecated, in registration order.
    pub fn active(&self) -> impl Iterator<Item = &CapabilityEntry> {
        self.capabilities
            .iter()
            .filter(|(key, entry)| !entry.capability.deprecated && !self.deprecated.contains(*key))
            .map(|(_, entry)| entry)
    }
}

/// Derives the capability catalog from registration and deprecation events.
///
/// Re-registering an existing `id@version` replaces its descriptor but keeps
/// its original position. Deprecation is sticky.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityProjection;

impl Projection for CapabilityProjection {
    type State = CapabilityState;

    fn initial_state(&self) -> CapabilityState {
        CapabilityState::default()
    }

    fn apply(&self, state: &mut CapabilityState, envelope: &EventEnvelope) {
        match decode_event(envelope) {
            Some(DomainEvent::CapabilityRegistered(e)) => {
                let entry = CapabilityEntry {
                    capability: e.capability,
                    event_id: envelope.event_id.clone(),
                };
                state.capabilities.insert(entry.key(), entry);
            }
            Some(DomainEvent::CapabilityDeprecated(e)) => {
                state
                    .deprecated
                    .insert(CapabilityKey::new(e.capability_id, e.version));
            }
            _ => {}
        }
    }
}
