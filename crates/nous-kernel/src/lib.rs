//! Event-sourced execution kernel.
//!
//! [`KernelExecutor`] wraps an arbitrary [`Graph`] with lifecycle events,
//! [`CheckpointManager`] records checkpoint history, and [`KernelBuilder`]
//! wires one store, journal and projection engine into an [`EventKernel`].

mod checkpoint;
mod executor;
mod graph;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use checkpoint::{
    CheckpointManager, CheckpointSaver, DEFAULT_THREAD, InMemoryCheckpointSaver,
    JsonFileCheckpointSaver,
};
pub use executor::KernelExecutor;
pub use graph::{Graph, KernelNode, NodeMeta, NodeResult};

use indexmap::IndexMap;
use nous_capability::{CapabilityRegistry, DeterministicResolver, DiscoveryService};
use nous_events::{
    Durability, EventJournal, EventStore, EventStreamHub, FileEventStore, InMemoryEventStore,
};
use nous_projection::{
    CognitiveProjection, ExecutionProjection, ProjectionEngine, SemanticProjection, names,
};
use nous_protocol::{AgentRef, ProjectionError};
use nous_tools::{ToolExecutor, ToolRegistry};
use serde_json::Value;
use tracing::{info, instrument};

/// File name of the event log under the kernel root.
pub const EVENT_LOG_FILE: &str = "events.jsonl";

/// Where the kernel keeps its event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process lifetime only.
    InMemory,
    /// JSON-Lines log at `<root>/events.jsonl`.
    #[default]
    File,
}

#[derive(Clone)]
pub struct KernelBuilder {
    root: PathBuf,
    backend: StoreBackend,
    durability: Durability,
    stream_buffer: usize,
    producer: AgentRef,
    saver: Option<Arc<dyn CheckpointSaver>>,
    audit_denials: bool,
}

impl KernelBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backend: StoreBackend::default(),
            durability: Durability::default(),
            stream_buffer: 1024,
            producer: AgentRef::new("kernel", "system"),
            saver: None,
            audit_denials: false,
        }
    }

    pub fn store(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer.max(1);
        self
    }

    pub fn producer(mut self, producer: AgentRef) -> Self {
        self.producer = producer;
        self
    }

    pub fn saver(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    /// Use a [`JsonFileCheckpointSaver`] under `<root>/checkpoints`.
    pub fn file_checkpoints(mut self) -> Self {
        self.saver = Some(Arc::new(JsonFileCheckpointSaver::new(
            self.root.join("checkpoints"),
        )));
        self
    }

    pub fn audit_denials(mut self, enabled: bool) -> Self {
        self.audit_denials = enabled;
        self
    }

    #[instrument(skip(self), fields(root = ?self.root, backend = ?self.backend))]
    pub async fn build(self) -> EventKernel {
        let store: Arc<dyn EventStore> = match self.backend {
            StoreBackend::InMemory => Arc::new(InMemoryEventStore::new()),
            StoreBackend::File => Arc::new(
                FileEventStore::new(self.root.join(EVENT_LOG_FILE))
                    .with_durability(self.durability),
            ),
        };
        let journal = EventJournal::new(store.clone(), EventStreamHub::new(self.stream_buffer));

        let engine = ProjectionEngine::new(store);
        engine.register(names::EXECUTION, ExecutionProjection).await;
        engine.register(names::COGNITIVE, CognitiveProjection).await;
        engine.register(names::SEMANTIC, SemanticProjection).await;
        let capabilities = CapabilityRegistry::new(journal.clone(), engine.clone()).await;
        let discovery = DiscoveryService::new(engine.clone());
        let resolver = DeterministicResolver::new(discovery.clone());

        let tools = Arc::new(ToolRegistry::with_core_tools().with_journal(journal.clone()));
        let tool_executor = ToolExecutor::new()
            .with_journal(journal.clone())
            .audit_denials(self.audit_denials);
        let checkpoints =
            CheckpointManager::new(self.saver, journal.clone(), self.producer.clone());

        info!("kernel assembled");
        EventKernel {
            root: self.root,
            journal,
            engine,
            capabilities,
            discovery,
            resolver,
            tools,
            tool_executor,
            checkpoints,
            producer: self.producer,
        }
    }
}

/// One store, one journal and the services built over them.
#[derive(Clone)]
pub struct EventKernel {
    root: PathBuf,
    journal: EventJournal,
    engine: ProjectionEngine,
    capabilities: CapabilityRegistry,
    discovery: DiscoveryService,
    resolver: DeterministicResolver,
    tools: Arc<ToolRegistry>,
    tool_executor: ToolExecutor,
    checkpoints: CheckpointManager,
    producer: AgentRef,
}

impl EventKernel {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn engine(&self) -> &ProjectionEngine {
        &self.engine
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    pub fn resolver(&self) -> &DeterministicResolver {
        &self.resolver
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn tool_executor(&self) -> &ToolExecutor {
        &self.tool_executor
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Executor for `graph` producing events as `producer`.
    pub fn executor(&self, graph: Arc<dyn Graph>, producer: AgentRef) -> KernelExecutor {
        KernelExecutor::new(graph, self.journal.clone(), producer)
    }

    /// Executor for `graph` producing events as the kernel's own agent.
    pub fn system_executor(&self, graph: Arc<dyn Graph>) -> KernelExecutor {
        self.executor(graph, self.producer.clone())
    }

    /// Every registered projection caught up and rendered as JSON.
    pub async fn snapshot(&self) -> Result<IndexMap<String, Value>, ProjectionError> {
        self.engine.snapshot_json().await
    }
}
