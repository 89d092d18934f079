use async_stream::stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use nous_protocol::EventEnvelope;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Broadcast hub for envelopes that have already been appended.
#[derive(Clone, Debug)]
pub struct EventStreamHub {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventStreamHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the envelope. Publishing with
    /// no subscribers is not an error.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.sender.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<EventEnvelope> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventStreamHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Live fan-out of envelopes to subscribers filtered by `event_type`.
///
/// Slow subscribers never block producers: when a receiver lags behind the
/// hub buffer the skipped envelopes are logged and dropped for that
/// subscriber only.
#[derive(Clone, Debug)]
pub struct EnvelopeBridge {
    hub: EventStreamHub,
}

impl EnvelopeBridge {
    pub fn new(hub: EventStreamHub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &EventStreamHub {
        &self.hub
    }

    /// Stream of envelopes whose `event_type` equals `event_type`.
    pub fn subscribe(&self, event_type: impl Into<String>) -> BoxStream<'static, EventEnvelope> {
        filtered(self.hub.subscribe(), Some(event_type.into()))
    }

    pub fn subscribe_all(&self) -> BoxStream<'static, EventEnvelope> {
        filtered(self.hub.subscribe(), None)
    }
}

pub(crate) fn filtered(
    mut receiver: broadcast::Receiver<EventEnvelope>,
    event_type: Option<String>,
) -> BoxStream<'static, EventEnvelope> {
    stream! {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    if event_type.as_ref().is_some_and(|t| envelope.event_type != *t) {
                        continue;
                    }
                    yield envelope;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, filter = ?event_type, "subscriber lagged, envelopes dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{task, task_ids};
    use nous_protocol::{AgentRef, AgentStarted, DomainEvent, TraceContext};

    fn started() -> EventEnvelope {
        DomainEvent::from(AgentStarted {
            agent_id: "a".into(),
            agent_type: "t".into(),
        })
        .to_envelope(&AgentRef::new("a", "t"), &TraceContext::root(), None, None)
        .unwrap()
    }

    #[tokio::test]
    async fn subscribe_filters_by_event_type() {
        let hub = EventStreamHub::new(16);
        let bridge = EnvelopeBridge::new(hub.clone());
        let mut tasks = bridge.subscribe("task.requested");
        let mut everything = bridge.subscribe_all();

        hub.publish(started());
        hub.publish(task("t1", None));

        let first = tasks.next().await.unwrap();
        assert_eq!(task_ids(&[first]), vec!["t1"]);
        assert_eq!(everything.next().await.unwrap().event_type, "agent.started");
        assert_eq!(everything.next().await.unwrap().event_type, "task.requested");
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_and_continues() {
        let hub = EventStreamHub::new(2);
        let bridge = EnvelopeBridge::new(hub.clone());
        let mut stream = bridge.subscribe("task.requested");

        for i in 0..5 {
            hub.publish(task(&format!("t{i}"), None));
        }
        let next = stream.next().await.unwrap();
        assert_eq!(task_ids(&[next]), vec!["t3"]);
        let next = stream.next().await.unwrap();
        assert_eq!(task_ids(&[next]), vec!["t4"]);
    }

    #[tokio::test]
    async fn stream_ends_when_hub_is_dropped() {
        let hub = EventStreamHub::new(4);
        let mut stream = EnvelopeBridge::new(hub.clone()).subscribe_all();
        assert_eq!(hub.receiver_count(), 1);
        drop(hub);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let hub = EventStreamHub::default();
        assert_eq!(hub.publish(task("t", None)), 0);
    }
}
