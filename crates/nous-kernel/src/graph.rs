use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use nous_protocol::{DomainEvent, NodeCompleted, NodeEntered};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// What a graph run hands back: the resulting state plus the domain events it
/// wants recorded.
///
/// `state` stays a raw [`Value`] so that a graph returning something other
/// than an object can be reported instead of silently coerced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResult {
    pub state: Value,
    pub events: Vec<DomainEvent>,
}

impl NodeResult {
    pub fn new(state: Map<String, Value>) -> Self {
        Self {
            state: Value::Object(state),
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: impl Into<DomainEvent>) -> Self {
        self.events.push(event.into());
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = DomainEvent>) -> Self {
        self.events.extend(events);
        self
    }
}

/// Execution hints attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub deterministic: bool,
    #[serde(default)]
    pub entropy_sources: Vec<String>,
}

impl Default for NodeMeta {
    fn default() -> Self {
        Self {
            deterministic: true,
            entropy_sources: Vec::new(),
        }
    }
}

impl NodeMeta {
    /// Metadata for a node that draws on the named entropy sources.
    pub fn stochastic<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deterministic: false,
            entropy_sources: sources.into_iter().map(Into::into).collect(),
        }
    }
}

/// A stateful computation the kernel wraps with lifecycle events.
#[async_trait]
pub trait Graph: Send + Sync {
    async fn invoke(
        &self,
        state: Map<String, Value>,
        config: Option<&Value>,
    ) -> anyhow::Result<NodeResult>;

    fn meta(&self) -> Option<&NodeMeta> {
        None
    }
}

/// Single-node graph around an async function.
///
/// Each successful call reports `kernel.node.entered` and
/// `kernel.node.completed` as pending events.
pub struct KernelNode<F> {
    node_id: String,
    graph_id: String,
    meta: NodeMeta,
    f: F,
}

impl<F, Fut> KernelNode<F>
where
    F: Fn(Map<String, Value>, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Map<String, Value>>> + Send,
{
    pub fn new(node_id: impl Into<String>, graph_id: impl Into<String>, f: F) -> Self {
        Self {
            node_id: node_id.into(),
            graph_id: graph_id.into(),
            meta: NodeMeta::default(),
            f,
        }
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[async_trait]
impl<F, Fut> Graph for KernelNode<F>
where
    F: Fn(Map<String, Value>, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Map<String, Value>>> + Send,
{
    async fn invoke(
        &self,
        state: Map<String, Value>,
        config: Option<&Value>,
    ) -> anyhow::Result<NodeResult> {
        let entered = NodeEntered {
            node_id: self.node_id.clone(),
            graph_id: self.graph_id.clone(),
        };
        let started = Instant::now();
        let next = (self.f)(state, config.cloned()).await?;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(node_id = %self.node_id, duration_ms, "node finished");
        Ok(NodeResult::new(next)
            .with_event(entered)
            .with_event(NodeCompleted {
                node_id: self.node_id.clone(),
                graph_id: self.graph_id.clone(),
                duration_ms,
            }))
    }

    fn meta(&self) -> Option<&NodeMeta> {
        Some(&self.meta)
    }
}
