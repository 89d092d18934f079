//! The canonical immutable event record.
//!
//! Envelopes are produced by [`DomainEvent::to_envelope`](crate::DomainEvent::to_envelope)
//! and are never edited once appended to a store. The `with_*` builders exist
//! for producers that need to attach routing or dedup hints between
//! construction and append.

use crate::ids::{AgentId, CorrelationId, EventId, InstanceId, SpanId, TraceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope format version written into every record.
pub const SPEC_VERSION: &str = "1.0.0";

/// Default per-event-type schema version.
pub const DEFAULT_EVENT_VERSION: &str = "1.0.0";

/// Runtime marker used when the producer does not name one.
pub const LOCAL_RUNTIME: &str = "local";

fn default_spec_version() -> String {
    SPEC_VERSION.to_owned()
}

fn default_event_version() -> String {
    DEFAULT_EVENT_VERSION.to_owned()
}

fn default_runtime_id() -> String {
    LOCAL_RUNTIME.to_owned()
}

/// Identity of the agent that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentRef {
    pub agent_id: AgentId,
    pub agent_type: String,
    #[serde(default = "default_runtime_id")]
    pub runtime_id: String,
    #[serde(default)]
    pub instance_id: InstanceId,
}

impl AgentRef {
    /// A producer on the local runtime with a fresh instance id.
    pub fn new(agent_id: impl Into<AgentId>, agent_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            runtime_id: default_runtime_id(),
            instance_id: InstanceId::generate(),
        }
    }

    pub fn with_runtime_id(mut self, runtime_id: impl Into<String>) -> Self {
        self.runtime_id = runtime_id.into();
        self
    }
}

/// Trace propagation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default)]
    pub parent_span_id: Option<SpanId>,
    #[serde(default)]
    pub depth: u32,
}

impl TraceContext {
    /// Start a new trace at depth 0.
    pub fn root() -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            depth: 0,
        }
    }

    /// Derive the context for the next hop: same trace, new span, one level deeper.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: SpanId::generate(),
            parent_span_id: Some(self.span_id.clone()),
            depth: self.depth + 1,
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::root()
    }
}

/// Detached signature carried alongside an envelope. The core never computes
/// or verifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureBlock {
    pub algorithm: String,
    pub public_key_id: String,
    pub signature: String,
}

/// The atomic record of one event, as stored.
///
/// Field order here is the order fields appear in serialized records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventEnvelope {
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    pub event_id: EventId,
    pub event_type: String,
    #[serde(default = "default_event_version")]
    pub event_version: String,
    pub timestamp: DateTime<Utc>,
    pub producer: AgentRef,
    pub trace: TraceContext,
    #[serde(default)]
    pub causation_id: Option<EventId>,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub partition_key: Option<String>,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub signature: Option<SignatureBlock>,
}

impl EventEnvelope {
    /// Assemble a fresh envelope. Crate-private: domain code goes through
    /// `DomainEvent::to_envelope`.
    pub(crate) fn assemble(
        event_type: impl Into<String>,
        producer: AgentRef,
        trace: TraceContext,
        causation_id: Option<EventId>,
        correlation_id: Option<CorrelationId>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            spec_version: default_spec_version(),
            event_id: EventId::generate(),
            event_type: event_type.into(),
            event_version: default_event_version(),
            timestamp: Utc::now(),
            producer,
            trace,
            causation_id,
            correlation_id,
            idempotency_key: None,
            partition_key: None,
            ttl_ms: None,
            payload,
            metadata: Map::new(),
            signature: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_signature(mut self, signature: SignatureBlock) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Whether the event has outlived its `ttl_ms` relative to `now`.
    /// Envelopes without a ttl never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_ms {
            Some(ttl) => {
                let age = now.signed_duration_since(self.timestamp).num_milliseconds();
                age >= 0 && age as u64 > ttl
            }
            None => false,
        }
    }
}
