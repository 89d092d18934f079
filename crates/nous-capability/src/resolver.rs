use nous_protocol::CapabilityError;
use tracing::debug;

use crate::discovery::DiscoveryService;
use crate::projection::CapabilityEntry;

/// Picks the first active match in registration order. No randomness and no
/// load balancing: an unchanged catalog always resolves the same way.
#[derive(Clone)]
pub struct DeterministicResolver {
    discovery: DiscoveryService,
}

impl DeterministicResolver {
    pub fn new(discovery: DiscoveryService) -> Self {
        Self { discovery }
    }

    pub async fn resolve(
        &self,
        capability_id: &str,
        version_range: Option<&str>,
    ) -> Result<CapabilityEntry, CapabilityError> {
        let entry = self
            .discovery
            .find(capability_id, version_range)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CapabilityError::NotFound {
                capability_id: capability_id.to_owned(),
                version_range: version_range.map(str::to_owned),
            })?;
        debug!(
            capability_id,
            agent_id = %entry.capability.agent_id,
            version = %entry.capability.version,
            "capability resolved"
        );
        Ok(entry)
    }
}
