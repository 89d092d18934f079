use std::collections::HashMap;

use indexmap::IndexMap;
use nous_events::EventJournal;
use nous_protocol::{AgentRef, ToolError, ToolId, ToolRegistered, TraceContext};
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::builtin;
use crate::tool::{AtomicTool, ToolSource};

#[derive(Default)]
struct Catalog {
    tools: IndexMap<ToolId, AtomicTool>,
    by_name: HashMap<String, ToolId>,
}

/// Tools addressable by id or by name. Registering a name twice replaces the
/// earlier tool.
pub struct ToolRegistry {
    catalog: RwLock<Catalog>,
    journal: Option<EventJournal>,
    producer: AgentRef,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            catalog: RwLock::new(Catalog::default()),
            journal: None,
            producer: AgentRef::new("tool_registry", "system"),
        }
    }

    /// Records a `tool.registered` event for every [`register`](Self::register).
    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_producer(mut self, producer: AgentRef) -> Self {
        self.producer = producer;
        self
    }

    /// Registry preloaded with `fs.read` and `fs.write`.
    pub fn with_core_tools() -> Self {
        let registry = Self::new();
        for tool in builtin::core_tools() {
            registry.insert(tool);
        }
        registry
    }

    /// Adds a tool without recording anything.
    pub fn insert(&self, tool: AtomicTool) {
        let mut catalog = self.catalog.write();
        if let Some(previous) = catalog.by_name.insert(tool.name.clone(), tool.tool_id.clone()) {
            if previous != tool.tool_id {
                catalog.tools.shift_remove(&previous);
            }
        }
        catalog.tools.insert(tool.tool_id.clone(), tool);
    }

    pub async fn register(&self, tool: AtomicTool) -> Result<(), ToolError> {
        let event = ToolRegistered {
            tool_id: tool.tool_id.clone(),
            tool_name: tool.name.clone(),
            source: tool.source.as_str().to_owned(),
            capabilities: describe(&tool),
        };
        debug!(tool = %tool.name, source = tool.source.as_str(), "registering tool");
        self.insert(tool);
        if let Some(journal) = &self.journal {
            journal
                .emit(event, &self.producer, &TraceContext::root(), None, None)
                .await?;
        }
        Ok(())
    }

    pub async fn register_many(
        &self,
        tools: impl IntoIterator<Item = AtomicTool>,
    ) -> Result<usize, ToolError> {
        let mut count = 0;
        for tool in tools {
            self.register(tool).await?;
            count += 1;
        }
        info!(count, "tools registered");
        Ok(count)
    }

    pub fn get_by_id(&self, tool_id: &ToolId) -> Result<AtomicTool, ToolError> {
        self.catalog
            .read()
            .tools
            .get(tool_id)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(tool_id.to_string()))
    }

    pub fn get_by_name(&self, name: &str) -> Result<AtomicTool, ToolError> {
        let catalog = self.catalog.read();
        catalog
            .by_name
            .get(name)
            .and_then(|id| catalog.tools.get(id))
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_owned()))
    }

    /// Tools in registration order, optionally filtered by source and by
    /// carrying every tag in `tags`.
    pub fn list(&self, source: Option<ToolSource>, tags: &[&str]) -> Vec<AtomicTool> {
        self.catalog
            .read()
            .tools
            .values()
            .filter(|tool| source.is_none_or(|s| tool.source == s))
            .filter(|tool| tags.iter().all(|tag| tool.tags.iter().any(|t| t == tag)))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.catalog.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn describe(tool: &AtomicTool) -> Map<String, Value> {
    let mut capabilities = Map::new();
    capabilities.insert("determinism".into(), json!(tool.determinism));
    capabilities.insert("side_effects".into(), json!(tool.side_effects));
    capabilities.insert("permissions".into(), json!(tool.permissions));
    capabilities.insert("timeout_ms".into(), json!(tool.timeout_ms));
    capabilities.insert("tags".into(), json!(tool.tags));
    capabilities
}
