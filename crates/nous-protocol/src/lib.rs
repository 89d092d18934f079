//! # nous-protocol: event contract for the nous core
//!
//! Shared types every other crate in the workspace builds on. The crate has no
//! async runtime dependency so it can be used as a pure contract crate by
//! producers that only need to construct or decode envelopes.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed ID wrappers (EventId, TraceId, SpanId, AgentId, ...)
//! - [`envelope`]: EventEnvelope, AgentRef, TraceContext, SignatureBlock
//! - [`event`]: DomainEvent catalog and the `to_envelope` conversion path
//! - [`capability`]: Capability descriptor and its classification enums
//! - [`codec`]: canonical form, JSON round-trip, SHA-256 digest
//! - [`error`]: error taxonomy shared by every layer

pub mod capability;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod event;
pub mod ids;

pub use capability::{Capability, CapabilityKey, DeterminismClass, LatencyClass, SideEffectClass};
pub use codec::{canonicalize, canonicalize_value, deserialize, digest, serialize};
pub use envelope::{AgentRef, EventEnvelope, SignatureBlock, TraceContext};
pub use error::{
    BoxError, CapabilityError, CheckpointError, CoreError, CoreResult, EventError, KernelError,
    ProjectionError, ToolError,
};
pub use event::{
    AgentStarted, AgentStopped, CapabilityCompleted, CapabilityDeprecated, CapabilityInvoked,
    CapabilityRegistered, CheckpointCreated, DomainEvent, ErrorOccurred, MemoryDeleted,
    MemoryLinked, MemoryWritten, NodeCompleted, NodeEntered, TaskCompleted, TaskRequested,
    ToolCompleted, ToolFailed, ToolInvoked, ToolPermissionDenied, ToolRegistered, ToolTimeout,
    event_types,
};
pub use ids::{
    AgentId, CheckpointId, CorrelationId, EventId, InstanceId, SpanId, ToolId, TraceId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_domain_event_is_reachable_from_the_crate_root() {
        let capability = Capability::new("search", "agent-A");
        let events: Vec<DomainEvent> = vec![
            CapabilityRegistered {
                capability: capability.clone(),
            }
            .into(),
            CapabilityDeprecated {
                capability_id: "search".into(),
                version: capability.version.clone(),
            }
            .into(),
        ];
        let types: Vec<&str> = events.iter().map(DomainEvent::event_type).collect();
        assert_eq!(
            types,
            vec![event_types::CAPABILITY_REGISTERED, event_types::CAPABILITY_DEPRECATED]
        );
    }
}
