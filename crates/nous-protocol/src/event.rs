//! Domain event catalog.
//!
//! Each concrete event is a plain serde struct whose fields become the
//! envelope payload. [`DomainEvent`] is the closed union over the catalog and
//! [`DomainEvent::to_envelope`] is the only path from domain logic to an
//! [`EventEnvelope`].
//!
//! Decoding is forward-compatible: envelopes whose `event_type` is not in the
//! catalog decode to `None` rather than failing, so older consumers can read
//! logs written by newer producers.

use crate::capability::Capability;
use crate::envelope::{AgentRef, EventEnvelope, TraceContext};
use crate::error::EventError;
use crate::ids::{AgentId, CheckpointId, CorrelationId, EventId, ToolId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dot-namespaced `event_type` strings.
pub mod event_types {
    pub const AGENT_STARTED: &str = "agent.started";
    pub const AGENT_STOPPED: &str = "agent.stopped";
    pub const NODE_ENTERED: &str = "kernel.node.entered";
    pub const NODE_COMPLETED: &str = "kernel.node.completed";
    pub const CHECKPOINT_CREATED: &str = "kernel.checkpoint.created";
    pub const CAPABILITY_REGISTERED: &str = "capability.registered";
    pub const CAPABILITY_DEPRECATED: &str = "capability.deprecated";
    pub const CAPABILITY_INVOKED: &str = "capability.invoked";
    pub const CAPABILITY_COMPLETED: &str = "capability.completed";
    pub const MEMORY_WRITTEN: &str = "memory.written";
    pub const MEMORY_DELETED: &str = "memory.deleted";
    pub const MEMORY_LINKED: &str = "memory.linked";
    pub const TASK_REQUESTED: &str = "task.requested";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TOOL_INVOKED: &str = "tool.invoked";
    pub const TOOL_COMPLETED: &str = "tool.completed";
    pub const TOOL_FAILED: &str = "tool.failed";
    pub const TOOL_TIMEOUT: &str = "tool.timeout";
    pub const TOOL_REGISTERED: &str = "tool.registered";
    pub const TOOL_PERMISSION_DENIED: &str = "tool.permission_denied";
    pub const ERROR_OCCURRED: &str = "system.error.occurred";
}

fn default_version() -> String {
    "1.0.0".to_owned()
}

// --- Agent lifecycle ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStarted {
    pub agent_id: AgentId,
    pub agent_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStopped {
    pub agent_id: AgentId,
    #[serde(default)]
    pub reason: String,
}

impl AgentStopped {
    pub const COMPLETED: &'static str = "completed";

    pub fn completed(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            reason: Self::COMPLETED.to_owned(),
        }
    }

    pub fn failed(agent_id: AgentId, message: impl std::fmt::Display) -> Self {
        Self {
            agent_id,
            reason: format!("error: {message}"),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.reason.starts_with("error:")
    }
}

// --- Kernel ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntered {
    pub node_id: String,
    pub graph_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCompleted {
    pub node_id: String,
    pub graph_id: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointCreated {
    pub checkpoint_id: CheckpointId,
    pub node_id: String,
}

// --- Capabilities ---

/// Payload is the full capability descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityRegistered {
    pub capability: Capability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDeprecated {
    pub capability_id: String,
    #[serde(default = "default_version")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityInvoked {
    pub caller_agent_id: AgentId,
    pub target_agent_id: AgentId,
    pub capability_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCompleted {
    pub capability_id: String,
    pub caller_agent_id: AgentId,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

// --- Memory ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryWritten {
    pub key: String,
    pub value_type: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDeleted {
    pub key: String,
    #[serde(default)]
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLinked {
    pub source_key: String,
    pub target_key: String,
    pub relation: String,
}

// --- Task delegation ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequested {
    pub task_id: String,
    pub capability_id: String,
    #[serde(default)]
    pub task_payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompleted {
    pub task_id: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

// --- Tools ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvoked {
    pub tool_id: ToolId,
    pub tool_name: String,
    #[serde(default)]
    pub input_data: Map<String, Value>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCompleted {
    pub tool_id: ToolId,
    pub tool_name: String,
    #[serde(default)]
    pub output_data: Value,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailed {
    pub tool_id: ToolId,
    pub tool_name: String,
    pub error: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTimeout {
    pub tool_id: ToolId,
    pub tool_name: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRegistered {
    pub tool_id: ToolId,
    pub tool_name: String,
    pub source: String,
    #[serde(default)]
    pub capabilities: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPermissionDenied {
    pub tool_id: ToolId,
    pub tool_name: String,
    pub missing: Vec<String>,
}

// --- Errors ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorOccurred {
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub original_event_id: Option<EventId>,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

macro_rules! domain_events {
    ($($ty:ident => $event_type:ident),* $(,)?) => {
        /// Closed union over the event catalog.
        #[derive(Debug, Clone, PartialEq)]
        pub enum DomainEvent {
            $($ty($ty),)*
        }

        impl DomainEvent {
            pub fn event_type(&self) -> &'static str {
                match self {
                    $(Self::$ty(_) => event_types::$event_type,)*
                }
            }

            /// Field mapping written into the envelope payload.
            pub fn payload(&self) -> Result<Map<String, Value>, EventError> {
                let value = match self {
                    $(Self::$ty(event) => serde_json::to_value(event)?,)*
                };
                match value {
                    Value::Object(map) => Ok(map),
                    other => Err(EventError::Validation(format!(
                        "{} payload is not an object: {other}",
                        self.event_type()
                    ))),
                }
            }

            /// Decode a stored envelope back into its typed event.
            ///
            /// Returns `Ok(None)` for event types outside the catalog and a
            /// validation error when a known type carries a malformed payload.
            pub fn decode(envelope: &EventEnvelope) -> Result<Option<Self>, EventError> {
                let payload = Value::Object(envelope.payload.clone());
                let event = match envelope.event_type.as_str() {
                    $(event_types::$event_type => Self::$ty(serde_json::from_value(payload)?),)*
                    _ => return Ok(None),
                };
                Ok(Some(event))
            }
        }

        $(
            impl From<$ty> for DomainEvent {
                fn from(event: $ty) -> Self {
                    Self::$ty(event)
                }
            }
        )*
    };
}

domain_events! {
    AgentStarted => AGENT_STARTED,
    AgentStopped => AGENT_STOPPED,
    NodeEntered => NODE_ENTERED,
    NodeCompleted => NODE_COMPLETED,
    CheckpointCreated => CHECKPOINT_CREATED,
    CapabilityRegistered => CAPABILITY_REGISTERED,
    CapabilityDeprecated => CAPABILITY_DEPRECATED,
    CapabilityInvoked => CAPABILITY_INVOKED,
    CapabilityCompleted => CAPABILITY_COMPLETED,
    MemoryWritten => MEMORY_WRITTEN,
    MemoryDeleted => MEMORY_DELETED,
    MemoryLinked => MEMORY_LINKED,
    TaskRequested => TASK_REQUESTED,
    TaskCompleted => TASK_COMPLETED,
    ToolInvoked => TOOL_INVOKED,
    ToolCompleted => TOOL_COMPLETED,
    ToolFailed => TOOL_FAILED,
    ToolTimeout => TOOL_TIMEOUT,
    ToolRegistered => TOOL_REGISTERED,
    ToolPermissionDenied => TOOL_PERMISSION_DENIED,
    ErrorOccurred => ERROR_OCCURRED,
}

impl DomainEvent {
    /// Build the envelope for this event.
    pub fn to_envelope(
        &self,
        producer: &AgentRef,
        trace: &TraceContext,
        causation_id: Option<EventId>,
        correlation_id: Option<CorrelationId>,
    ) -> Result<EventEnvelope, EventError> {
        Ok(EventEnvelope::assemble(
            self.event_type(),
            producer.clone(),
            trace.clone(),
            causation_id,
            correlation_id,
            self.payload()?,
        ))
    }
}
