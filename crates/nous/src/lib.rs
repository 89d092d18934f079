//! Event-sourced agent core.
//!
//! Producers turn [`DomainEvent`]s into [`EventEnvelope`]s and append them to
//! an [`EventStore`]; projections fold the log into typed state; capability
//! discovery, the kernel executor and the tool executor are built on the same
//! log. Start from [`KernelBuilder`] for a wired-up [`EventKernel`].

pub use nous_capability as capability;
pub use nous_events as events;
pub use nous_kernel as kernel;
pub use nous_projection as projection;
pub use nous_protocol as protocol;
pub use nous_tools as tools;

pub use nous_capability::{
    CapabilityEntry, CapabilityRegistry, CapabilityState, DeterministicResolver, DiscoveryService,
};
pub use nous_events::{
    Durability, EnvelopeBridge, EventJournal, EventStore, EventStreamHub, FileEventStore,
    InMemoryEventStore, ReadQuery,
};
pub use nous_kernel::{
    CheckpointManager, CheckpointSaver, EventKernel, Graph, InMemoryCheckpointSaver,
    JsonFileCheckpointSaver, KernelBuilder, KernelExecutor, KernelNode, NodeMeta, NodeResult,
    StoreBackend,
};
pub use nous_projection::{Projection, ProjectionEngine};
pub use nous_protocol::{
    AgentRef, Capability, CapabilityKey, CoreError, CoreResult, DomainEvent, EventEnvelope,
    TraceContext,
};
pub use nous_tools::{AtomicTool, ToolContext, ToolExecutor, ToolPermission, ToolRegistry};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use anyhow::Result;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use nous_protocol::{CapabilityError, ToolError, event_types};
    use proptest::prelude::*;
    use serde_json::{Map, Value, json};

    use super::*;

    fn unique_test_root(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    async fn in_memory_kernel() -> EventKernel {
        KernelBuilder::new(unique_test_root("nous-facade"))
            .store(StoreBackend::InMemory)
            .build()
            .await
    }

    #[tokio::test]
    async fn capability_lifecycle_end_to_end() -> Result<()> {
        let kernel = in_memory_kernel().await;
        kernel
            .capabilities()
            .register(Capability::new("search", "agent-A").with_version("1.0.0"))
            .await?;
        kernel
            .capabilities()
            .register(Capability::new("search", "agent-B").with_version("2.0.0"))
            .await?;

        assert_eq!(kernel.discovery().find("search", None).await?.len(), 2);
        let first = kernel.resolver().resolve("search", None).await?;
        assert_eq!(first.capability.agent_id.as_str(), "agent-A");
        let second = kernel.resolver().resolve("search", Some("2")).await?;
        assert_eq!(second.capability.agent_id.as_str(), "agent-B");

        kernel.capabilities().deprecate("search", "1.0.0").await?;
        kernel.capabilities().deprecate("search", "2.0.0").await?;
        assert!(kernel.discovery().find("search", None).await?.is_empty());
        assert!(matches!(
            kernel.resolver().resolve("search", None).await,
            Err(CapabilityError::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn stored_envelopes_keep_their_digest() -> Result<()> {
        let root = unique_test_root("nous-facade-digest");
        let kernel = KernelBuilder::new(&root).build().await;
        let registered = kernel
            .capabilities()
            .register(Capability::new("sum", "agent-M").with_tags(["math"]))
            .await?;

        let store = FileEventStore::new(root.join(nous_kernel::EVENT_LOG_FILE));
        let stored = store.read(ReadQuery::all()).await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], registered);
        assert_eq!(
            nous_protocol::digest(&stored[0])?,
            nous_protocol::digest(&registered)?
        );

        let _ = tokio::fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn replay_then_live_sees_every_run_once() -> Result<()> {
        let kernel = in_memory_kernel().await;
        let graph: Arc<dyn Graph> = Arc::new(KernelNode::new("n", "g", |s, _| async { Ok(s) }));
        let executor = kernel.system_executor(graph);
        executor.execute(Map::new(), None).await?;

        let mut stream = kernel
            .journal()
            .replay_and_subscribe(0, Some(event_types::AGENT_STOPPED.to_owned()))
            .await?;
        executor.execute(Map::new(), None).await?;

        let first = stream.next().await.ok_or_else(|| anyhow::anyhow!("ended"))?;
        let second = stream.next().await.ok_or_else(|| anyhow::anyhow!("ended"))?;
        assert_ne!(first.event_id, second.event_id);
        assert_ne!(first.correlation_id, second.correlation_id);
        Ok(())
    }

    #[derive(Debug, Clone, Copy)]
    enum Outcome {
        Succeed,
        Fail,
        Hang,
        Denied,
    }

    fn outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Succeed),
            Just(Outcome::Fail),
            Just(Outcome::Hang),
            Just(Outcome::Denied),
        ]
    }

    fn tool_for(outcome: Outcome) -> AtomicTool {
        let tool = AtomicTool::new(format!("{outcome:?}").to_lowercase(), "test tool").with_timeout_ms(5);
        match outcome {
            Outcome::Succeed => tool.bind_fn(|_| async { Ok(json!("ok")) }),
            Outcome::Fail => tool.bind_fn(|_| async { Err(anyhow::anyhow!("nope")) }),
            Outcome::Hang => tool.bind_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            }),
            Outcome::Denied => tool
                .with_permissions([ToolPermission::ShellExecute])
                .bind_fn(|_| async { Ok(Value::Null) }),
        }
    }

    struct Flaky(bool);

    #[async_trait]
    impl Graph for Flaky {
        async fn invoke(&self, state: Map<String, Value>, _: Option<&Value>) -> anyhow::Result<NodeResult> {
            if self.0 {
                Ok(NodeResult::new(state))
            } else {
                anyhow::bail!("flaky graph failed")
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn every_permitted_tool_call_ends_exactly_once(outcomes in proptest::collection::vec(outcome(), 1..8)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            rt.block_on(async {
                let kernel = in_memory_kernel().await;
                let ctx = ToolContext::new("agent");
                for outcome in &outcomes {
                    let result = kernel.tool_executor().run(&tool_for(*outcome), &ctx, Map::new()).await;
                    let expected = match outcome {
                        Outcome::Succeed => result.is_ok(),
                        Outcome::Fail => matches!(result, Err(ToolError::Execution { .. })),
                        Outcome::Hang => matches!(result, Err(ToolError::Timeout { .. })),
                        Outcome::Denied => matches!(result, Err(ToolError::PermissionDenied { .. })),
                    };
                    prop_assert!(expected, "{:?} gave {:?}", outcome, result);
                }

                let events = kernel.journal().read(ReadQuery::all()).await.unwrap();
                let invoked: Vec<&EventEnvelope> = events
                    .iter()
                    .filter(|e| e.event_type == event_types::TOOL_INVOKED)
                    .collect();
                let permitted = outcomes.iter().filter(|o| !matches!(o, Outcome::Denied)).count();
                prop_assert_eq!(invoked.len(), permitted);
                for call in invoked {
                    let terminals = events
                        .iter()
                        .filter(|e| e.causation_id.as_ref() == Some(&call.event_id))
                        .filter(|e| matches!(
                            e.event_type.as_str(),
                            event_types::TOOL_COMPLETED | event_types::TOOL_FAILED | event_types::TOOL_TIMEOUT
                        ))
                        .count();
                    prop_assert_eq!(terminals, 1);
                }
                Ok(())
            })?;
        }

        #[test]
        fn every_kernel_run_is_paired(runs in proptest::collection::vec(any::<bool>(), 1..10)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let kernel = in_memory_kernel().await;
                for succeed in &runs {
                    let result = kernel
                        .system_executor(Arc::new(Flaky(*succeed)))
                        .execute(Map::new(), None)
                        .await;
                    prop_assert_eq!(result.is_ok(), *succeed);
                }

                let events = kernel.journal().read(ReadQuery::all()).await.unwrap();
                let started: Vec<&EventEnvelope> = events
                    .iter()
                    .filter(|e| e.event_type == event_types::AGENT_STARTED)
                    .collect();
                prop_assert_eq!(started.len(), runs.len());
                for start in started {
                    let stops: Vec<usize> = events
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| e.event_type == event_types::AGENT_STOPPED)
                        .filter(|(_, e)| e.correlation_id == start.correlation_id)
                        .map(|(i, _)| i)
                        .collect();
                    prop_assert_eq!(stops.len(), 1);
                    let start_at = events.iter().position(|e| e.event_id == start.event_id).unwrap();
                    prop_assert!(stops[0] > start_at);
                }

                let execution = kernel.engine().get_state_json(nous_projection::names::EXECUTION).await.unwrap();
                let failures = runs.iter().filter(|ok| !**ok).count();
                prop_assert_eq!(execution["agents_failed"].as_u64(), Some(failures as u64));
                prop_assert_eq!(execution["agents_started"].clone(), execution["agents_stopped"].clone());
                Ok(())
            })?;
        }
    }
}
