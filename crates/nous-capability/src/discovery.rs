use nous_projection::{ProjectionEngine, names};
use nous_protocol::{CapabilityError, DeterminismClass};

use crate::projection::{CapabilityEntry, CapabilityState};

/// Read-side queries over the active catalog. Empty results are normal.
#[derive(Clone)]
pub struct DiscoveryService {
    engine: ProjectionEngine,
}

impl DiscoveryService {
    pub fn new(engine: ProjectionEngine) -> Self {
        Self { engine }
    }

    async fn state(&self) -> Result<CapabilityState, CapabilityError> {
        Ok(self.engine.get_state(names::CAPABILITY).await?)
    }

    /// Active registrations of `capability_id`, optionally restricted to
    /// versions starting with `version_range`.
    pub async fn find(
        &self,
        capability_id: &str,
        version_range: Option<&str>,
    ) -> Result<Vec<CapabilityEntry>, CapabilityError> {
        let state = self.state().await?;
        Ok(state
            .active()
            .filter(|entry| entry.capability.capability_id == capability_id)
            .filter(|entry| version_range.is_none_or(|prefix| entry.capability.version.starts_with(prefix)))
            .cloned()
            .collect())
    }

    pub async fn find_by_tag(&self, tag: &str) -> Result<Vec<CapabilityEntry>, CapabilityError> {
        let state = self.state().await?;
        Ok(state
            .active()
            .filter(|entry| entry.capability.tags.iter().any(|t| t == tag))
            .cloned()
            .collect())
    }

    pub async fn find_by_determinism(
        &self,
        class: DeterminismClass,
    ) -> Result<Vec<CapabilityEntry>, CapabilityError> {
        let state = self.state().await?;
        Ok(state
            .active()
            .filter(|entry| entry.capability.determinism == class)
            .cloned()
            .collect())
    }

    /// Every active registration in registration order.
    pub async fn list(&self) -> Result<Vec<CapabilityEntry>, CapabilityError> {
        Ok(self.state().await?.active().cloned().collect())
    }
}
