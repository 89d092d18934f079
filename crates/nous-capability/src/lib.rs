//! Capability catalog built on projections.
//!
//! Registration and deprecation are events appended through the journal.
//! The catalog itself is [`CapabilityProjection`] state, queried by
//! [`DiscoveryService`] and [`DeterministicResolver`].

mod discovery;
mod projection;
mod registry;
mod resolver;

pub use discovery::DiscoveryService;
pub use projection::{CapabilityEntry, CapabilityProjection, CapabilityState};
pub use registry::CapabilityRegistry;
pub use resolver::DeterministicResolver;
