use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use nous_protocol::{
    AgentId, CorrelationId, DeterminismClass, SideEffectClass, ToolError, ToolId, TraceContext,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a tool came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    Builtin,
    Langchain,
    Mcp,
    #[default]
    User,
}

impl ToolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Langchain => "langchain",
            Self::Mcp => "mcp",
            Self::User => "user",
        }
    }
}

/// Coarse permission a tool requires and a caller may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ToolPermission {
    #[serde(rename = "fs:read")]
    FsRead,
    #[serde(rename = "fs:write")]
    FsWrite,
    #[serde(rename = "net:outbound")]
    NetOutbound,
    #[serde(rename = "shell:execute")]
    ShellExecute,
    #[serde(rename = "env:read")]
    EnvRead,
    #[serde(rename = "mcp:connect")]
    McpConnect,
}

impl ToolPermission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FsRead => "fs:read",
            Self::FsWrite => "fs:write",
            Self::NetOutbound => "net:outbound",
            Self::ShellExecute => "shell:execute",
            Self::EnvRead => "env:read",
            Self::McpConnect => "mcp:connect",
        }
    }
}

impl fmt::Display for ToolPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executable body bound to a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Map<String, Value>, context: &ToolContext) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, input: Map<String, Value>, _context: &ToolContext) -> anyhow::Result<Value> {
        (self.0)(input).await
    }
}

/// The smallest executable unit: an immutable descriptor plus an optional
/// bound handler.
#[derive(Clone, Serialize, Deserialize)]
pub struct AtomicTool {
    #[serde(default)]
    pub tool_id: ToolId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Map<String, Value>,
    #[serde(default)]
    pub output_schema: Option<Map<String, Value>>,
    #[serde(default)]
    pub source: ToolSource,
    #[serde(default)]
    pub determinism: DeterminismClass,
    #[serde(default = "effectful")]
    pub side_effects: SideEffectClass,
    #[serde(default)]
    pub permissions: Vec<ToolPermission>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub toolkit_name: Option<String>,
    #[serde(skip)]
    handler: Option<Arc<dyn ToolHandler>>,
}

fn effectful() -> SideEffectClass {
    SideEffectClass::Effectful
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl AtomicTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tool_id: ToolId::generate(),
            name: name.into(),
            description: description.into(),
            input_schema: Map::new(),
            output_schema: None,
            source: ToolSource::default(),
            determinism: DeterminismClass::default(),
            side_effects: effectful(),
            permissions: Vec::new(),
            timeout_ms: default_timeout_ms(),
            tags: Vec::new(),
            toolkit_name: None,
            handler: None,
        }
    }

    pub fn with_source(mut self, source: ToolSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = ToolPermission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_input_schema(mut self, schema: Map<String, Value>) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn bind(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn bind_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.bind(FnHandler(f))
    }

    pub fn is_bound(&self) -> bool {
        self.handler.is_some()
    }

    /// Permissions this tool needs that `granted` lacks, in a stable order.
    pub fn missing_permissions(&self, granted: &BTreeSet<ToolPermission>) -> Vec<ToolPermission> {
        let required: BTreeSet<ToolPermission> = self.permissions.iter().copied().collect();
        required.difference(granted).copied().collect()
    }

    /// Run the bound handler without any event bookkeeping.
    pub async fn execute(
        &self,
        input: Map<String, Value>,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let handler = self
            .handler
            .as_ref()
            .ok_or_else(|| ToolError::Unbound(self.name.clone()))?;
        handler
            .call(input, context)
            .await
            .map_err(|err| ToolError::Execution {
                tool: self.name.clone(),
                source: err.into(),
            })
    }
}

impl fmt::Debug for AtomicTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicTool")
            .field("tool_id", &self.tool_id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("permissions", &self.permissions)
            .field("timeout_ms", &self.timeout_ms)
            .field("bound", &self.is_bound())
            .finish_non_exhaustive()
    }
}

/// Per-invocation caller context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub agent_id: AgentId,
    pub trace: TraceContext,
    pub granted_permissions: BTreeSet<ToolPermission>,
    pub working_directory: Option<PathBuf>,
    pub correlation_id: Option<CorrelationId>,
}

impl ToolContext {
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            trace: TraceContext::root(),
            granted_permissions: BTreeSet::new(),
            working_directory: None,
            correlation_id: None,
        }
    }

    pub fn grant(mut self, permissions: impl IntoIterator<Item = ToolPermission>) -> Self {
        self.granted_permissions.extend(permissions);
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
