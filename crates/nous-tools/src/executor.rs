use std::time::{Duration, Instant};

use nous_events::EventJournal;
use nous_protocol::{
    AgentRef, DomainEvent, EventEnvelope, EventId, ToolCompleted, ToolError, ToolFailed,
    ToolInvoked, ToolPermissionDenied, ToolTimeout,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::registry::ToolRegistry;
use crate::tool::{AtomicTool, ToolContext};

/// Wraps tool calls in `tool.invoked` and exactly one terminal event.
///
/// Without a journal nothing is recorded, which keeps the executor usable in
/// quiet contexts.
#[derive(Clone)]
pub struct ToolExecutor {
    journal: Option<EventJournal>,
    producer: AgentRef,
    audit_denials: bool,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self {
            journal: None,
            producer: AgentRef::new("tool_executor", "system"),
            audit_denials: false,
        }
    }

    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_producer(mut self, producer: AgentRef) -> Self {
        self.producer = producer;
        self
    }

    /// Record `tool.permission_denied` for refused calls. Off by default.
    pub fn audit_denials(mut self, enabled: bool) -> Self {
        self.audit_denials = enabled;
        self
    }

    /// Gate on permissions, then execute under the tool's timeout.
    ///
    /// A store error while recording is returned as [`ToolError::Event`]. If
    /// it hits the terminal event the handler has already run and the log
    /// keeps a `tool.invoked` without a terminal event; the store is not
    /// asked again with a different outcome.
    #[instrument(skip_all, fields(tool = %tool.name, agent_id = %context.agent_id))]
    pub async fn run(
        &self,
        tool: &AtomicTool,
        context: &ToolContext,
        input: Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let missing = tool.missing_permissions(&context.granted_permissions);
        if !missing.is_empty() {
            let missing: Vec<String> = missing.iter().map(ToString::to_string).collect();
            warn!(?missing, "tool call denied");
            if self.audit_denials {
                self.record(
                    ToolPermissionDenied {
                        tool_id: tool.tool_id.clone(),
                        tool_name: tool.name.clone(),
                        missing: missing.clone(),
                    },
                    context,
                    None,
                )
                .await?;
            }
            return Err(ToolError::PermissionDenied {
                tool: tool.name.clone(),
                missing,
            });
        }

        let invoked = self
            .record(
                ToolInvoked {
                    tool_id: tool.tool_id.clone(),
                    tool_name: tool.name.clone(),
                    input_data: input.clone(),
                    source: tool.source.as_str().to_owned(),
                },
                context,
                None,
            )
            .await?;
        let cause = invoked.map(|envelope| envelope.event_id);

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(Duration::from_millis(tool.timeout_ms), tool.execute(input, context))
                .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(output)) => {
                self.record(
                    ToolCompleted {
                        tool_id: tool.tool_id.clone(),
                        tool_name: tool.name.clone(),
                        output_data: output.clone(),
                        duration_ms,
                    },
                    context,
                    cause,
                )
                .await?;
                info!(duration_ms, "tool completed");
                Ok(output)
            }
            Ok(Err(err)) => {
                self.record(
                    ToolFailed {
                        tool_id: tool.tool_id.clone(),
                        tool_name: tool.name.clone(),
                        error: error_chain(&err),
                        duration_ms,
                    },
                    context,
                    cause,
                )
                .await?;
                warn!(duration_ms, error = %err, "tool failed");
                Err(err)
            }
            Err(_elapsed) => {
                self.record(
                    ToolTimeout {
                        tool_id: tool.tool_id.clone(),
                        tool_name: tool.name.clone(),
                        timeout_ms: tool.timeout_ms,
                    },
                    context,
                    cause,
                )
                .await?;
                warn!(timeout_ms = tool.timeout_ms, "tool timed out");
                Err(ToolError::Timeout {
                    tool: tool.name.clone(),
                    timeout_ms: tool.timeout_ms,
                })
            }
        }
    }

    /// Look `name` up in `registry` and [`run`](Self::run) it.
    pub async fn run_by_name(
        &self,
        registry: &ToolRegistry,
        name: &str,
        context: &ToolContext,
        input: Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let tool = registry.get_by_name(name)?;
        self.run(&tool, context, input).await
    }

    async fn record(
        &self,
        event: impl Into<DomainEvent>,
        context: &ToolContext,
        causation_id: Option<EventId>,
    ) -> Result<Option<EventEnvelope>, ToolError> {
        let Some(journal) = &self.journal else {
            return Ok(None);
        };
        let envelope = journal
            .emit(
                event,
                &self.producer,
                &context.trace.child(),
                causation_id,
                context.correlation_id.clone(),
            )
            .await?;
        Ok(Some(envelope))
    }
}

fn error_chain(err: &ToolError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}
