use nous_events::EventJournal;
use nous_projection::{ProjectionEngine, names};
use nous_protocol::{
    AgentRef, Capability, CapabilityDeprecated, CapabilityError, CapabilityRegistered,
    DomainEvent, EventEnvelope, TraceContext,
};
use tracing::{info, instrument};

use crate::projection::{CapabilityProjection, CapabilityState};

/// Registers and deprecates capabilities by emitting events.
///
/// The journal and the engine must share one store. Each call appends, then
/// brings the engine to the store head, so the new envelope is visible to the
/// next query and records other producers appended around it are folded in
/// log order exactly once.
#[derive(Clone)]
pub struct CapabilityRegistry {
    journal: EventJournal,
    engine: ProjectionEngine,
    producer: AgentRef,
    trace: TraceContext,
}

impl CapabilityRegistry {
    /// Creates the registry and registers the catalog projection on `engine`.
    pub async fn new(journal: EventJournal, engine: ProjectionEngine) -> Self {
        engine
            .register(names::CAPABILITY, CapabilityProjection)
            .await;
        Self {
            journal,
            engine,
            producer: AgentRef::new("registry", "system"),
            trace: TraceContext::root(),
        }
    }

    pub fn with_producer(mut self, producer: AgentRef) -> Self {
        self.producer = producer;
        self
    }

    pub fn engine(&self) -> &ProjectionEngine {
        &self.engine
    }

    #[instrument(skip(self, capability), fields(capability_id = %capability.capability_id, version = %capability.version))]
    pub async fn register(&self, capability: Capability) -> Result<EventEnvelope, CapabilityError> {
        let envelope = self.record(CapabilityRegistered { capability }).await?;
        info!("capability registered");
        Ok(envelope)
    }

    #[instrument(skip(self))]
    pub async fn deprecate(
        &self,
        capability_id: &str,
        version: &str,
    ) -> Result<EventEnvelope, CapabilityError> {
        let envelope = self
            .record(CapabilityDeprecated {
                capability_id: capability_id.to_owned(),
                version: version.to_owned(),
            })
            .await?;
        info!("capability deprecated");
        Ok(envelope)
    }

    /// Current catalog state.
    pub async fn state(&self) -> Result<CapabilityState, CapabilityError> {
        Ok(self.engine.get_state(names::CAPABILITY).await?)
    }

    async fn record(&self, event: impl Into<DomainEvent>) -> Result<EventEnvelope, CapabilityError> {
        let envelope = event
            .into()
            .to_envelope(&self.producer, &self.trace.child(), None, None)?;
        self.journal.append_and_publish(envelope.clone()).await?;
        self.engine.catch_up().await?;
        Ok(envelope)
    }
}
