use async_trait::async_trait;
use nous_protocol::{EventEnvelope, EventError};
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::store::{EventStore, ReadQuery};

/// Process-lifetime store backed by an ordered vector.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<EventEnvelope>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[instrument(skip(self, envelope), fields(event_type = %envelope.event_type))]
    async fn append(&self, envelope: &EventEnvelope) -> Result<(), EventError> {
        let mut events = self.events.write();
        events.push(envelope.clone());
        debug!(offset = events.len() - 1, "event appended to memory store");
        Ok(())
    }

    #[instrument(skip(self), fields(from_offset = query.from_offset))]
    async fn read(&self, query: ReadQuery) -> Result<Vec<EventEnvelope>, EventError> {
        let events = self.events.read();
        Ok(query.select(events.iter()))
    }

    async fn last_offset(&self) -> Result<u64, EventError> {
        Ok(self.events.read().len() as u64)
    }
}
