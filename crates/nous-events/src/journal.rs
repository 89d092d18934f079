use std::collections::HashSet;
use std::sync::Arc;

use async_stream::stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use nous_protocol::{
    AgentRef, CorrelationId, DomainEvent, EventEnvelope, EventError, EventId, TraceContext,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, instrument, warn};

use crate::store::{EventStore, ReadQuery};
use crate::stream::{EnvelopeBridge, EventStreamHub};

/// Store plus live hub. Every envelope is appended exactly once and then
/// published; a failed append publishes nothing.
#[derive(Clone)]
pub struct EventJournal {
    store: Arc<dyn EventStore>,
    stream: EventStreamHub,
}

impl EventJournal {
    pub fn new(store: Arc<dyn EventStore>, stream: EventStreamHub) -> Self {
        Self { store, stream }
    }

    #[instrument(skip(self, envelope), fields(event_type = %envelope.event_type, event_id = %envelope.event_id))]
    pub async fn append_and_publish(&self, envelope: EventEnvelope) -> Result<(), EventError> {
        self.store.append(&envelope).await?;
        let receivers = self.stream.publish(envelope);
        debug!(receivers, "event published to stream");
        Ok(())
    }

    /// Convert, append and publish a domain event, returning its envelope.
    pub async fn emit(
        &self,
        event: impl Into<DomainEvent>,
        producer: &AgentRef,
        trace: &TraceContext,
        causation_id: Option<EventId>,
        correlation_id: Option<CorrelationId>,
    ) -> Result<EventEnvelope, EventError> {
        let envelope =
            event
                .into()
                .to_envelope(producer, trace, causation_id, correlation_id)?;
        self.append_and_publish(envelope.clone()).await?;
        Ok(envelope)
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn hub(&self) -> &EventStreamHub {
        &self.stream
    }

    pub fn bridge(&self) -> EnvelopeBridge {
        EnvelopeBridge::new(self.stream.clone())
    }

    pub async fn read(&self, query: ReadQuery) -> Result<Vec<EventEnvelope>, EventError> {
        self.store.read(query).await
    }

    pub async fn last_offset(&self) -> Result<u64, EventError> {
        self.store.last_offset().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.stream.subscribe()
    }

    /// Stored envelopes from `from_offset` followed by live ones.
    ///
    /// The live subscription is opened before the replay read, so an append
    /// racing with the call is delivered once, either from the replay or live.
    pub async fn replay_and_subscribe(
        &self,
        from_offset: u64,
        event_type: Option<String>,
    ) -> Result<BoxStream<'static, EventEnvelope>, EventError> {
        let mut receiver = self.stream.subscribe();
        let mut query = ReadQuery::from_offset(from_offset);
        query.event_type = event_type.clone();
        let replay = self.store.read(query).await?;
        let mut seen: HashSet<EventId> = replay.iter().map(|e| e.event_id.clone()).collect();

        Ok(stream! {
            for envelope in replay {
                yield envelope;
            }
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        if seen.remove(&envelope.event_id) {
                            continue;
                        }
                        if event_type.as_ref().is_some_and(|t| envelope.event_type != *t) {
                            continue;
                        }
                        yield envelope;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "replay subscriber lagged, envelopes dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryEventStore;
    use crate::test_support::{task, task_ids};
    use async_trait::async_trait;
    use nous_protocol::{AgentStarted, TaskCompleted};

    struct FailingStore;

    #[async_trait]
    impl EventStore for FailingStore {
        async fn append(&self, _envelope: &EventEnvelope) -> Result<(), EventError> {
            Err(EventError::Store("disk full".into()))
        }
        async fn read(&self, _query: ReadQuery) -> Result<Vec<EventEnvelope>, EventError> {
            Ok(Vec::new())
        }
        async fn last_offset(&self) -> Result<u64, EventError> {
            Ok(0)
        }
    }

    fn journal() -> (EventJournal, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::new());
        (
            EventJournal::new(store.clone(), EventStreamHub::new(32)),
            store,
        )
    }

    #[tokio::test]
    async fn appends_once_then_publishes() {
        let (journal, store) = journal();
        let mut rx = journal.subscribe();

        journal.append_and_publish(task("t1", None)).await.unwrap();

        assert_eq!(store.len(), 1);
        let live = rx.recv().await.unwrap();
        assert_eq!(task_ids(&[live]), vec!["t1"]);
    }

    #[tokio::test]
    async fn failed_append_publishes_nothing() {
        let journal = EventJournal::new(Arc::new(FailingStore), EventStreamHub::new(4));
        let mut rx = journal.subscribe();
        let err = journal.append_and_publish(task("t1", None)).await;
        assert!(matches!(err, Err(EventError::Store(_))));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn emit_builds_envelope_from_domain_event() {
        let (journal, store) = journal();
        let producer = AgentRef::new("agent-1", "worker");
        let trace = TraceContext::root();
        let envelope = journal
            .emit(
                AgentStarted {
                    agent_id: "agent-1".into(),
                    agent_type: "worker".into(),
                },
                &producer,
                &trace,
                None,
                Some("flow".into()),
            )
            .await
            .unwrap();
        assert_eq!(envelope.event_type, "agent.started");
        assert_eq!(store.read_all().await.unwrap(), vec![envelope]);
    }

    #[tokio::test]
    async fn replay_then_live_without_duplicates() {
        let (journal, _store) = journal();
        journal.append_and_publish(task("old-1", None)).await.unwrap();
        journal.append_and_publish(task("old-2", None)).await.unwrap();

        let mut stream = journal
            .replay_and_subscribe(1, Some("task.requested".into()))
            .await
            .unwrap();

        journal
            .emit(
                TaskCompleted {
                    task_id: "ignored".into(),
                    result: serde_json::Value::Null,
                    error: None,
                },
                &AgentRef::new("a", "t"),
                &TraceContext::root(),
                None,
                None,
            )
            .await
            .unwrap();
        journal.append_and_publish(task("new-1", None)).await.unwrap();

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(task_ids(&[first, second]), vec!["old-2", "new-1"]);
    }
}
