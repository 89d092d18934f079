use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use nous_events::{EventJournal, ReadQuery};
use nous_protocol::{
    AgentRef, CheckpointCreated, CheckpointError, CheckpointId, DomainEvent, EventEnvelope,
    TraceContext, event_types,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

/// Thread used when a config carries no `thread_id`.
pub const DEFAULT_THREAD: &str = "default";

/// Synchronous checkpoint backend.
pub trait CheckpointSaver: Send + Sync {
    fn put(&self, config: &Map<String, Value>, data: &Value) -> anyhow::Result<()>;
    fn get(&self, config: &Map<String, Value>) -> anyhow::Result<Option<Value>>;
}

fn thread_id(config: &Map<String, Value>) -> &str {
    config
        .get("thread_id")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_THREAD)
}

/// Latest checkpoint per thread, held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointSaver {
    threads: Mutex<HashMap<String, Value>>,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointSaver for InMemoryCheckpointSaver {
    fn put(&self, config: &Map<String, Value>, data: &Value) -> anyhow::Result<()> {
        self.threads
            .lock()
            .insert(thread_id(config).to_owned(), data.clone());
        Ok(())
    }

    fn get(&self, config: &Map<String, Value>) -> anyhow::Result<Option<Value>> {
        Ok(self.threads.lock().get(thread_id(config)).cloned())
    }
}

/// One `<thread_id>.json` file per thread under `root`.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointSaver {
    root: PathBuf,
}

impl JsonFileCheckpointSaver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, config: &Map<String, Value>) -> anyhow::Result<PathBuf> {
        let thread = thread_id(config);
        if thread.is_empty() || thread.contains(['/', '\\']) || thread == "." || thread == ".." {
            bail!("invalid checkpoint thread id: {thread:?}");
        }
        Ok(self.root.join(format!("{thread}.json")))
    }
}

impl CheckpointSaver for JsonFileCheckpointSaver {
    fn put(&self, config: &Map<String, Value>, data: &Value) -> anyhow::Result<()> {
        let path = self.path_for(config)?;
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed creating checkpoint dir {:?}", self.root))?;
        let bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&path, bytes).with_context(|| format!("failed writing checkpoint {path:?}"))?;
        Ok(())
    }

    fn get(&self, config: &Map<String, Value>) -> anyhow::Result<Option<Value>> {
        let path = self.path_for(config)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed reading checkpoint {path:?}"));
            }
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt checkpoint {path:?}"))?;
        Ok(Some(value))
    }
}

/// Persists checkpoints through an optional saver and records
/// `kernel.checkpoint.created` for every successful save.
#[derive(Clone)]
pub struct CheckpointManager {
    saver: Option<Arc<dyn CheckpointSaver>>,
    journal: EventJournal,
    producer: AgentRef,
    trace: TraceContext,
}

impl CheckpointManager {
    pub fn new(
        saver: Option<Arc<dyn CheckpointSaver>>,
        journal: EventJournal,
        producer: AgentRef,
    ) -> Self {
        Self {
            saver,
            journal,
            producer,
            trace: TraceContext::root(),
        }
    }

    pub fn has_saver(&self) -> bool {
        self.saver.is_some()
    }

    /// Hands `data` to the saver when both are present, then records the
    /// event. A saver failure records nothing.
    #[instrument(skip(self, config, data), fields(checkpoint_id = %checkpoint_id))]
    pub async fn save(
        &self,
        checkpoint_id: CheckpointId,
        node_id: &str,
        config: Option<&Map<String, Value>>,
        data: Option<&Value>,
    ) -> Result<EventEnvelope, CheckpointError> {
        if let (Some(saver), Some(data)) = (&self.saver, data) {
            let empty = Map::new();
            saver
                .put(config.unwrap_or(&empty), data)
                .map_err(|err| CheckpointError::Save {
                    checkpoint_id: checkpoint_id.to_string(),
                    source: err.into(),
                })?;
            debug!("checkpoint persisted");
        }

        let envelope = DomainEvent::from(CheckpointCreated {
            checkpoint_id,
            node_id: node_id.to_owned(),
        })
        .to_envelope(&self.producer, &self.trace.child(), None, None)?;
        self.journal.append_and_publish(envelope.clone()).await?;
        info!(node_id, "checkpoint created");
        Ok(envelope)
    }

    /// Latest checkpoint for `config`; `None` without a saver.
    pub async fn load(
        &self,
        config: Option<&Map<String, Value>>,
    ) -> Result<Option<Value>, CheckpointError> {
        let Some(saver) = &self.saver else {
            return Ok(None);
        };
        let empty = Map::new();
        saver
            .get(config.unwrap_or(&empty))
            .map_err(|err| CheckpointError::Load { source: err.into() })
    }

    /// `kernel.checkpoint.created` envelopes from `from_offset` onward.
    pub async fn replay_from(&self, from_offset: u64) -> Result<Vec<EventEnvelope>, CheckpointError> {
        Ok(self
            .journal
            .read(ReadQuery::from_offset(from_offset).event_type(event_types::CHECKPOINT_CREATED))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::unique_test_root;
    use nous_events::{EventStreamHub, InMemoryEventStore};
    use serde_json::json;

    struct BrokenSaver;

    impl CheckpointSaver for BrokenSaver {
        fn put(&self, _: &Map<String, Value>, _: &Value) -> anyhow::Result<()> {
            bail!("disk full")
        }

        fn get(&self, _: &Map<String, Value>) -> anyhow::Result<Option<Value>> {
            bail!("disk gone")
        }
    }

    fn journal() -> EventJournal {
        EventJournal::new(Arc::new(InMemoryEventStore::new()), EventStreamHub::new(16))
    }

    fn thread(id: &str) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("thread_id".into(), json!(id));
        config
    }

    fn manager(saver: Option<Arc<dyn CheckpointSaver>>, journal: EventJournal) -> CheckpointManager {
        CheckpointManager::new(saver, journal, AgentRef::new("kernel", "system"))
    }

    #[tokio::test]
    async fn save_without_saver_still_records_event() -> anyhow::Result<()> {
        let journal = journal();
        let manager = manager(None, journal.clone());

        manager
            .save(CheckpointId::from("cp-1"), "plan", None, Some(&json!({"x": 1})))
            .await?;
        assert!(manager.load(None).await?.is_none());

        let history = manager.replay_from(0).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload["checkpoint_id"], "cp-1");
        assert_eq!(history[0].payload["node_id"], "plan");
        Ok(())
    }

    #[tokio::test]
    async fn saver_round_trips_per_thread() -> anyhow::Result<()> {
        let manager = manager(Some(Arc::new(InMemoryCheckpointSaver::new())), journal());
        manager
            .save(CheckpointId::generate(), "a", Some(&thread("t1")), Some(&json!({"step": 1})))
            .await?;
        manager
            .save(CheckpointId::generate(), "b", Some(&thread("t2")), Some(&json!({"step": 2})))
            .await?;

        assert_eq!(manager.load(Some(&thread("t1"))).await?, Some(json!({"step": 1})));
        assert_eq!(manager.load(Some(&thread("t2"))).await?, Some(json!({"step": 2})));
        assert_eq!(manager.load(Some(&thread("t3"))).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn saver_failure_suppresses_event() -> anyhow::Result<()> {
        let journal = journal();
        let manager = manager(Some(Arc::new(BrokenSaver)), journal.clone());

        let err = manager
            .save(CheckpointId::from("cp-x"), "plan", None, Some(&json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Save { ref checkpoint_id, .. } if checkpoint_id == "cp-x"));
        assert_eq!(journal.last_offset().await?, 0);

        assert!(matches!(
            manager.load(None).await,
            Err(CheckpointError::Load { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn replay_skips_earlier_offsets_and_other_events() -> anyhow::Result<()> {
        let journal = journal();
        let manager = manager(None, journal.clone());
        for id in ["cp-1", "cp-2", "cp-3"] {
            manager.save(CheckpointId::from(id), "n", None, None).await?;
        }
        let ids: Vec<Value> = manager
            .replay_from(1)
            .await?
            .into_iter()
            .map(|e| e.payload["checkpoint_id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("cp-2"), json!("cp-3")]);
        Ok(())
    }

    #[test]
    fn json_file_saver_persists_across_instances() -> anyhow::Result<()> {
        let root = unique_test_root("nous-kernel-checkpoints");
        let saver = JsonFileCheckpointSaver::new(&root);
        assert!(saver.get(&thread("t1"))?.is_none());

        saver.put(&thread("t1"), &json!({"messages": ["hi"]}))?;
        let reopened = JsonFileCheckpointSaver::new(&root);
        assert_eq!(reopened.get(&thread("t1"))?, Some(json!({"messages": ["hi"]})));
        assert!(root.join("t1.json").exists());
        assert!(saver.put(&thread("../escape"), &json!({})).is_err());

        let _ = fs::remove_dir_all(root);
        Ok(())
    }
}
