use nous_protocol::{DomainEvent, EventEnvelope};
use serde::Serialize;
use tracing::warn;

/// A deterministic function from an ordered event sequence to state.
///
/// `apply` must depend only on the state and the envelope. Event types a
/// projection does not know are ignored.
pub trait Projection: Send + Sync + 'static {
    type State: Clone + Serialize + Send + Sync + 'static;

    fn initial_state(&self) -> Self::State;

    fn apply(&self, state: &mut Self::State, event: &EventEnvelope);

    /// Replay `events` from the initial state.
    fn fold<'a, I>(&self, events: I) -> Self::State
    where
        I: IntoIterator<Item = &'a EventEnvelope>,
        Self: Sized,
    {
        let mut state = self.initial_state();
        for event in events {
            self.apply(&mut state, event);
        }
        state
    }
}

/// Decode `envelope` for a projection. Unknown types give `None`; a known
/// type whose payload does not decode is logged and also gives `None`.
pub fn decode_event(envelope: &EventEnvelope) -> Option<DomainEvent> {
    match DomainEvent::decode(envelope) {
        Ok(event) => event,
        Err(err) => {
            warn!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                error = %err,
                "skipping malformed payload"
            );
            None
        }
    }
}
