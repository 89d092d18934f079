use async_trait::async_trait;
use nous_protocol::{CorrelationId, EventEnvelope, EventError};

/// Window and filters for [`EventStore::read`].
///
/// The window starts at `from_offset` in append order. Filters apply to the
/// windowed records and `limit` caps what is returned after filtering, so the
/// offset of a record never depends on the filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadQuery {
    pub from_offset: u64,
    pub limit: Option<usize>,
    pub event_type: Option<String>,
    pub correlation_id: Option<CorrelationId>,
}

impl ReadQuery {
    /// Every record from the start of the log.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_offset(offset: u64) -> Self {
        Self {
            from_offset: offset,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Whether a record inside the window passes the filters.
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(event_type) = &self.event_type
            && envelope.event_type != *event_type
        {
            return false;
        }
        if let Some(correlation_id) = &self.correlation_id
            && envelope.correlation_id.as_ref() != Some(correlation_id)
        {
            return false;
        }
        true
    }

    pub(crate) fn is_full(&self, collected: usize) -> bool {
        self.limit.is_some_and(|limit| collected >= limit)
    }

    /// Apply the window, filters and limit to an in-order sequence.
    pub(crate) fn select<'a, I>(&self, records: I) -> Vec<EventEnvelope>
    where
        I: IntoIterator<Item = &'a EventEnvelope>,
    {
        let mut out = Vec::new();
        if self.is_full(0) {
            return out;
        }
        for envelope in records.into_iter().skip(self.from_offset as usize) {
            if !self.matches(envelope) {
                continue;
            }
            out.push(envelope.clone());
            if self.is_full(out.len()) {
                break;
            }
        }
        out
    }
}

/// Ordered append-only log of envelopes.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one record. Once this returns, subsequent reads see it.
    async fn append(&self, envelope: &EventEnvelope) -> Result<(), EventError>;

    /// Records in strict append order, selected by `query`.
    async fn read(&self, query: ReadQuery) -> Result<Vec<EventEnvelope>, EventError>;

    /// Total number of appended records.
    async fn last_offset(&self) -> Result<u64, EventError>;

    async fn read_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<EventEnvelope>, EventError> {
        self.read(ReadQuery::all().correlation(correlation_id.clone()))
            .await
    }

    async fn read_all(&self) -> Result<Vec<EventEnvelope>, EventError> {
        self.read(ReadQuery::all()).await
    }
}
