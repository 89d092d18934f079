use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use nous_events::{EventStore, ReadQuery};
use nous_protocol::{EventEnvelope, ProjectionError};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::projection::Projection;

trait Slot: Send {
    fn apply(&mut self, envelope: &EventEnvelope);
    fn reset(&mut self);
    fn offset(&self) -> u64;
    fn set_offset(&mut self, offset: u64);
    fn state(&self) -> &dyn Any;
    fn state_json(&self) -> Result<Value, serde_json::Error>;
}

struct TypedSlot<P: Projection> {
    projection: P,
    state: P::State,
    offset: u64,
}

impl<P: Projection> Slot for TypedSlot<P> {
    fn apply(&mut self, envelope: &EventEnvelope) {
        self.projection.apply(&mut self.state, envelope);
    }

    fn reset(&mut self) {
        self.state = self.projection.initial_state();
        self.offset = 0;
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    fn state(&self) -> &dyn Any {
        &self.state
    }

    fn state_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.state)
    }
}

/// Named projections over one shared store, each with its cached state and
/// the offset of the next record it has not applied.
///
/// Calls on the engine are serialized internally, so concurrent `get_state`
/// and `rebuild` calls never interleave their offset bookkeeping.
#[derive(Clone)]
pub struct ProjectionEngine {
    store: Arc<dyn EventStore>,
    slots: Arc<Mutex<IndexMap<String, Box<dyn Slot>>>>,
}

impl ProjectionEngine {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            slots: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Register `projection` under `name` at offset 0. Re-registering a name
    /// replaces the previous projection and its cached state.
    pub async fn register<P: Projection>(&self, name: impl Into<String>, projection: P) {
        let name = name.into();
        let state = projection.initial_state();
        let slot = TypedSlot {
            projection,
            state,
            offset: 0,
        };
        let replaced = self
            .slots
            .lock()
            .await
            .insert(name.clone(), Box::new(slot))
            .is_some();
        info!(projection = %name, replaced, "projection registered");
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.slots.lock().await.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        self.slots.lock().await.keys().cloned().collect()
    }

    pub async fn offset(&self, name: &str) -> Result<u64, ProjectionError> {
        let slots = self.slots.lock().await;
        slots
            .get(name)
            .map(|slot| slot.offset())
            .ok_or_else(|| ProjectionError::NotRegistered(name.to_owned()))
    }

    /// Apply records appended since the last call, then return the state.
    #[instrument(skip(self), fields(projection = %name))]
    pub async fn get_state<S: Clone + 'static>(&self, name: &str) -> Result<S, ProjectionError> {
        let mut slots = self.slots.lock().await;
        let slot = slot_mut(&mut slots, name)?;
        self.advance(name, &mut **slot).await?;
        downcast(name, &**slot)
    }

    /// Same as [`get_state`](Self::get_state), rendered as JSON.
    pub async fn get_state_json(&self, name: &str) -> Result<Value, ProjectionError> {
        let mut slots = self.slots.lock().await;
        let slot = slot_mut(&mut slots, name)?;
        self.advance(name, &mut **slot).await?;
        to_json(name, &**slot)
    }

    /// Discard cached state and replay the whole log.
    #[instrument(skip(self), fields(projection = %name))]
    pub async fn rebuild<S: Clone + 'static>(&self, name: &str) -> Result<S, ProjectionError> {
        let mut slots = self.slots.lock().await;
        let slot = slot_mut(&mut slots, name)?;
        self.replay(name, &mut **slot).await?;
        downcast(name, &**slot)
    }

    /// Rebuild every registered projection.
    pub async fn rebuild_all(&self) -> Result<(), ProjectionError> {
        let mut slots = self.slots.lock().await;
        for (name, slot) in slots.iter_mut() {
            self.replay(name, &mut **slot).await?;
        }
        Ok(())
    }

    /// Apply one envelope the caller already holds to every projection and
    /// advance each offset by one.
    pub async fn apply_event(&self, envelope: &EventEnvelope) {
        let mut slots = self.slots.lock().await;
        for slot in slots.values_mut() {
            slot.apply(envelope);
            slot.set_offset(slot.offset() + 1);
        }
        debug!(event_type = %envelope.event_type, projections = slots.len(), "event applied");
    }

    /// Bring every projection to the store head with one read. Returns the
    /// head offset.
    #[instrument(skip(self))]
    pub async fn catch_up(&self) -> Result<u64, ProjectionError> {
        let mut slots = self.slots.lock().await;
        let Some(lowest) = slots.values().map(|slot| slot.offset()).min() else {
            return Ok(self.store.last_offset().await?);
        };
        let events = self.store.read(ReadQuery::from_offset(lowest)).await?;
        let head = lowest + events.len() as u64;
        for slot in slots.values_mut() {
            let skip = (slot.offset() - lowest) as usize;
            for event in events.iter().skip(skip) {
                slot.apply(event);
            }
            slot.set_offset(head.max(slot.offset()));
        }
        debug!(head, "projections caught up");
        Ok(head)
    }

    /// JSON state of every projection, in registration order, after catch-up.
    pub async fn snapshot_json(&self) -> Result<IndexMap<String, Value>, ProjectionError> {
        self.catch_up().await?;
        let slots = self.slots.lock().await;
        slots
            .iter()
            .map(|(name, slot)| Ok((name.clone(), to_json(name, &**slot)?)))
            .collect()
    }

    async fn advance(&self, name: &str, slot: &mut dyn Slot) -> Result<(), ProjectionError> {
        let from = slot.offset();
        let events = self.store.read(ReadQuery::from_offset(from)).await?;
        if events.is_empty() {
            return Ok(());
        }
        for event in &events {
            slot.apply(event);
        }
        slot.set_offset(from + events.len() as u64);
        debug!(projection = %name, applied = events.len(), offset = slot.offset(), "projection advanced");
        Ok(())
    }

    async fn replay(&self, name: &str, slot: &mut dyn Slot) -> Result<(), ProjectionError> {
        let events = self.store.read(ReadQuery::all()).await?;
        slot.reset();
        for event in &events {
            slot.apply(event);
        }
        slot.set_offset(events.len() as u64);
        info!(projection = %name, offset = slot.offset(), "projection rebuilt");
        Ok(())
    }
}

fn slot_mut<'a>(
    slots: &'a mut IndexMap<String, Box<dyn Slot>>,
    name: &str,
) -> Result<&'a mut Box<dyn Slot>, ProjectionError> {
    slots
        .get_mut(name)
        .ok_or_else(|| ProjectionError::NotRegistered(name.to_owned()))
}

fn downcast<S: Clone + 'static>(name: &str, slot: &dyn Slot) -> Result<S, ProjectionError> {
    slot.state()
        .downcast_ref::<S>()
        .cloned()
        .ok_or_else(|| ProjectionError::StateType {
            name: name.to_owned(),
            expected: std::any::type_name::<S>(),
        })
}

fn to_json(name: &str, slot: &dyn Slot) -> Result<Value, ProjectionError> {
    slot.state_json().map_err(|err| {
        ProjectionError::Event(nous_protocol::EventError::Validation(format!(
            "projection {name} state is not serializable: {err}"
        )))
    })
}
