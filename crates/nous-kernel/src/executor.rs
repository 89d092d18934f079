use std::sync::Arc;

use nous_events::EventJournal;
use nous_protocol::{
    AgentRef, AgentStarted, AgentStopped, CorrelationId, DomainEvent, EventEnvelope, EventId,
    KernelError, TraceContext,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::graph::Graph;

/// Runs a [`Graph`] between `agent.started` and `agent.stopped`.
///
/// Every `execute` call records exactly one of each, in that order, whether
/// the graph succeeds or not. Events returned by the graph are recorded in
/// between, caused by the start event and sharing one correlation id per run.
#[derive(Clone)]
pub struct KernelExecutor {
    graph: Arc<dyn Graph>,
    journal: EventJournal,
    producer: AgentRef,
}

impl KernelExecutor {
    pub fn new(graph: Arc<dyn Graph>, journal: EventJournal, producer: AgentRef) -> Self {
        Self {
            graph,
            journal,
            producer,
        }
    }

    pub fn producer(&self) -> &AgentRef {
        &self.producer
    }

    #[instrument(skip_all, fields(agent_id = %self.producer.agent_id))]
    pub async fn execute(
        &self,
        initial_state: Map<String, Value>,
        config: Option<Value>,
    ) -> Result<Map<String, Value>, KernelError> {
        let run = Run {
            trace: TraceContext::root(),
            correlation_id: CorrelationId::generate(),
        };

        let mut started = self.envelope(
            AgentStarted {
                agent_id: self.producer.agent_id.clone(),
                agent_type: self.producer.agent_type.clone(),
            },
            &run,
            None,
        )?;
        if let Some(meta) = self.graph.meta() {
            started = started.with_metadata(
                "kernel_meta",
                serde_json::to_value(meta).map_err(nous_protocol::EventError::from)?,
            );
        }
        let cause = started.event_id.clone();
        self.journal.append_and_publish(started).await?;
        info!(correlation_id = %run.correlation_id, "graph run started");

        let result = match self.graph.invoke(initial_state, config.as_ref()).await {
            Ok(result) => result,
            Err(err) => {
                let message = format!("{err:#}");
                self.stop(AgentStopped::failed(self.producer.agent_id.clone(), &message), &run, &cause)
                    .await?;
                warn!(error = %message, "graph run failed");
                return Err(KernelError::Execution {
                    message,
                    source: err.into(),
                });
            }
        };

        let state = match result.state {
            Value::Object(state) => state,
            other => {
                let message = format!("graph must return an object state, got {}", kind(&other));
                self.stop(AgentStopped::failed(self.producer.agent_id.clone(), &message), &run, &cause)
                    .await?;
                warn!(error = %message, "graph returned malformed state");
                return Err(KernelError::MalformedResult(message));
            }
        };

        let pending = result.events.len();
        for event in result.events {
            let recorded = match self.envelope(event, &run, Some(cause.clone())) {
                Ok(envelope) => self
                    .journal
                    .append_and_publish(envelope)
                    .await
                    .map_err(KernelError::from),
                Err(err) => Err(err),
            };
            if let Err(err) = recorded {
                let reason = format!("pending event not recorded: {err}");
                if let Err(stop_err) = self
                    .stop(AgentStopped::failed(self.producer.agent_id.clone(), &reason), &run, &cause)
                    .await
                {
                    warn!(error = %stop_err, "stop event not recorded");
                }
                warn!(error = %err, "graph run aborted");
                return Err(err);
            }
        }

        self.stop(AgentStopped::completed(self.producer.agent_id.clone()), &run, &cause)
            .await?;
        info!(pending, "graph run completed");
        Ok(state)
    }

    async fn stop(&self, stopped: AgentStopped, run: &Run, cause: &EventId) -> Result<(), KernelError> {
        let envelope = self.envelope(stopped, run, Some(cause.clone()))?;
        self.journal.append_and_publish(envelope).await?;
        Ok(())
    }

    fn envelope(
        &self,
        event: impl Into<DomainEvent>,
        run: &Run,
        causation_id: Option<EventId>,
    ) -> Result<EventEnvelope, KernelError> {
        Ok(event.into().to_envelope(
            &self.producer,
            &run.trace.child(),
            causation_id,
            Some(run.correlation_id.clone()),
        )?)
    }
}

struct Run {
    trace: TraceContext,
    correlation_id: CorrelationId,
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
