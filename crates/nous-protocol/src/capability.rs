//! Capability descriptors.
//!
//! A capability is something an agent declares it can do. Registration and
//! deprecation are events; the live catalog is a projection keyed by
//! [`CapabilityKey`].

use crate::ids::AgentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

fn default_version() -> String {
    "1.0.0".to_owned()
}

/// Whether repeated invocations with equal input produce equal output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeterminismClass {
    Deterministic,
    #[default]
    Stochastic,
    External,
}

/// What an invocation does to the world outside the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectClass {
    #[default]
    Pure,
    Idempotent,
    Effectful,
}

/// Expected response-time class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    Realtime,
    #[default]
    Fast,
    Batch,
}

/// Declarative description of a capability offered by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub capability_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Map<String, Value>,
    #[serde(default)]
    pub output_schema: Map<String, Value>,
    #[serde(default)]
    pub determinism: DeterminismClass,
    #[serde(default)]
    pub side_effects: SideEffectClass,
    #[serde(default)]
    pub latency: LatencyClass,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl Capability {
    /// Descriptor with default classes and version `1.0.0`.
    pub fn new(capability_id: impl Into<String>, agent_id: impl Into<AgentId>) -> Self {
        Self {
            capability_id: capability_id.into(),
            version: default_version(),
            agent_id: agent_id.into(),
            description: String::new(),
            input_schema: Map::new(),
            output_schema: Map::new(),
            determinism: DeterminismClass::default(),
            side_effects: SideEffectClass::default(),
            latency: LatencyClass::default(),
            tags: Vec::new(),
            roles: Vec::new(),
            scopes: Vec::new(),
            deprecated: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_determinism(mut self, determinism: DeterminismClass) -> Self {
        self.determinism = determinism;
        self
    }

    pub fn with_side_effects(mut self, side_effects: SideEffectClass) -> Self {
        self.side_effects = side_effects;
        self
    }

    pub fn with_latency(mut self, latency: LatencyClass) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn key(&self) -> CapabilityKey {
        CapabilityKey::new(&self.capability_id, &self.version)
    }
}

/// Composite catalog key.
///
/// Held as two fields in memory and rendered as `id@version` only when
/// displayed or serialized. Parsing splits on the last `@`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CapabilityKey {
    pub capability_id: String,
    pub version: String,
}

impl CapabilityKey {
    pub fn new(capability_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            capability_id: capability_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.capability_id, self.version)
    }
}

impl From<CapabilityKey> for String {
    fn from(key: CapabilityKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for CapabilityKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.rsplit_once('@') {
            Some((id, version)) if !id.is_empty() => Ok(Self::new(id, version)),
            _ => Err(format!("capability key without version: {value}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_descriptor_contract() {
        let cap: Capability =
            serde_json::from_str(r#"{"capability_id":"search","agent_id":"agent-A"}"#).unwrap();
        assert_eq!(cap.version, "1.0.0");
        assert_eq!(cap.determinism, DeterminismClass::Stochastic);
        assert_eq!(cap.side_effects, SideEffectClass::Pure);
        assert_eq!(cap.latency, LatencyClass::Fast);
        assert!(!cap.deprecated);
    }

    #[test]
    fn classes_serialize_snake_case() {
        let json = serde_json::to_value(DeterminismClass::Deterministic).unwrap();
        assert_eq!(json, "deterministic");
        let json = serde_json::to_value(LatencyClass::Realtime).unwrap();
        assert_eq!(json, "realtime");
    }

    #[test]
    fn key_keeps_delimiters_apart() {
        let a = CapabilityKey::new("a@b", "1");
        let b = CapabilityKey::new("a", "b@1");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn key_serializes_as_rendered_string() {
        let key = CapabilityKey::new("search", "2.0.0");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"search@2.0.0\"");
        let back: CapabilityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<CapabilityKey>("\"search\"").is_err());
    }

    #[test]
    fn tags_are_set_like() {
        let cap = Capability::new("search", "agent-A").with_tags(["web", "web", "fast"]);
        assert_eq!(cap.tags, vec!["web".to_string(), "fast".to_string()]);
    }
}
