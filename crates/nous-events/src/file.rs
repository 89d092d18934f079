use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nous_protocol::{EventEnvelope, EventError, canonicalize, deserialize};
use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, instrument};

use crate::store::{EventStore, ReadQuery};

/// How hard an append pushes the record toward the disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Durability {
    /// Flush the userspace buffer after every append.
    #[default]
    Flush,
    /// Flush, then `sync_data` after every append.
    Sync,
}

/// JSON-Lines log: one canonical envelope per line, offsets are the 0-based
/// index among non-blank lines.
///
/// All appends from this process go through one async write lock, so the
/// store is the single writer of its file. Several processes writing the
/// same file are not supported.
#[derive(Debug)]
pub struct FileEventStore {
    path: PathBuf,
    durability: Durability,
    write_lock: tokio::sync::Mutex<()>,
    count_cache: Mutex<Option<u64>>,
}

impl FileEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            durability: Durability::default(),
            write_lock: tokio::sync::Mutex::new(()),
            count_cache: Mutex::new(None),
        }
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(path: &Path) -> Result<(), EventError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn open_lines(
        path: &Path,
    ) -> Result<Option<tokio::io::Lines<BufReader<fs::File>>>, EventError> {
        let file = match OpenOptions::new().read(true).open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(BufReader::new(file).lines()))
    }

    async fn scan_count(path: &Path) -> Result<u64, EventError> {
        let Some(mut lines) = Self::open_lines(path).await? else {
            return Ok(0);
        };
        let mut count = 0_u64;
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn cached_count(&self) -> Result<u64, EventError> {
        let cached = *self.count_cache.lock();
        if let Some(count) = cached {
            return Ok(count);
        }
        let count = Self::scan_count(&self.path).await?;
        *self.count_cache.lock() = Some(count);
        Ok(count)
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    #[instrument(skip(self, envelope), fields(event_type = %envelope.event_type, path = ?self.path))]
    async fn append(&self, envelope: &EventEnvelope) -> Result<(), EventError> {
        let mut line = canonicalize(envelope)?;
        line.push('\n');
        Self::ensure_parent(&self.path).await?;

        let _guard = self.write_lock.lock().await;
        let offset = self.cached_count().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        if self.durability == Durability::Sync {
            file.sync_data().await?;
        }

        *self.count_cache.lock() = Some(offset + 1);
        debug!(offset, "event appended to log");
        Ok(())
    }

    #[instrument(skip(self), fields(from_offset = query.from_offset, path = ?self.path))]
    async fn read(&self, query: ReadQuery) -> Result<Vec<EventEnvelope>, EventError> {
        let mut out = Vec::new();
        if query.is_full(0) {
            return Ok(out);
        }
        let Some(mut lines) = Self::open_lines(&self.path).await? else {
            return Ok(out);
        };

        let mut offset = 0_u64;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let current = offset;
            offset += 1;
            if current < query.from_offset {
                continue;
            }
            let envelope = deserialize(&line).map_err(|err| {
                EventError::Validation(format!(
                    "corrupt record at offset {current} in {}: {err}",
                    self.path.display()
                ))
            })?;
            if !query.matches(&envelope) {
                continue;
            }
            out.push(envelope);
            if query.is_full(out.len()) {
                break;
            }
        }
        debug!(count = out.len(), "events loaded from log");
        Ok(out)
    }

    async fn last_offset(&self) -> Result<u64, EventError> {
        self.cached_count().await
    }
}
