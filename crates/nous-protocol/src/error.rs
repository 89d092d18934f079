//! Error types for the nous core.
//!
//! One enum per failure kind. Failures coming out of externally supplied
//! computation (graphs, savers, tool handlers) are kept as the `source()` of
//! the wrapping variant.

use thiserror::Error;

/// Boxed error used for failures raised by collaborator code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Envelope validation and store failures.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("envelope validation failed: {0}")]
    Validation(String),
    #[error("event store error: {0}")]
    Store(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Errors raised by the kernel executor.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("graph execution failed: {message}")]
    Execution {
        message: String,
        #[source]
        source: BoxError,
    },
    #[error("malformed graph result: {0}")]
    MalformedResult(String),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Checkpoint saver failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to save checkpoint {checkpoint_id}")]
    Save {
        checkpoint_id: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to load checkpoint")]
    Load {
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Projection engine failures.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("projection not registered: {0}")]
    NotRegistered(String),
    #[error("projection {name} does not hold state of type {expected}")]
    StateType { name: String, expected: &'static str },
    #[error("projection {name} version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        name: String,
        expected: String,
        found: String,
    },
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Capability discovery and resolution failures.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error(
        "capability not found: {capability_id}{}",
        version_range.as_deref().map(|v| format!(" (version {v}*)")).unwrap_or_default()
    )]
    NotFound {
        capability_id: String,
        version_range: Option<String>,
    },
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Tool registry and execution failures.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("tool {0} has no bound handler")]
    Unbound(String),
    #[error("tool {tool} denied: missing permissions {missing:?}")]
    PermissionDenied { tool: String, missing: Vec<String> },
    #[error("tool {tool} failed")]
    Execution {
        tool: String,
        #[source]
        source: BoxError,
    },
    #[error("tool {tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Umbrella error for callers that drive several subsystems.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Convenience result type across the core.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn not_found_renders_version_prefix() {
        let plain = CapabilityError::NotFound {
            capability_id: "search".into(),
            version_range: None,
        };
        assert_eq!(plain.to_string(), "capability not found: search");

        let ranged = CapabilityError::NotFound {
            capability_id: "search".into(),
            version_range: Some("2".into()),
        };
        assert_eq!(ranged.to_string(), "capability not found: search (version 2*)");
    }

    #[test]
    fn execution_error_keeps_source() {
        let err = KernelError::Execution {
            message: "boom".into(),
            source: "boom".into(),
        };
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "graph execution failed: boom");
    }

    #[test]
    fn core_error_wraps_each_kind() {
        let err: CoreError = ToolError::NotFound("echo".into()).into();
        assert!(matches!(err, CoreError::Tool(ToolError::NotFound(_))));
        let err: CoreError = EventError::Store("closed".into()).into();
        assert!(matches!(err, CoreError::Event(_)));
    }
}
