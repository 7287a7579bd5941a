//! Capability and agent/tool catalog records (§3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single declared parameter of a [`Capability`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityParameter {
    pub name: String,
    /// JSON-schema-ish type name: "string", "number", "boolean", "object", "array".
    #[serde(rename = "type")]
    pub type_name: String,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// A named operation exposed by an agent/tool, with an HTTP endpoint and a
/// parameter schema. Immutable once discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    pub parameters: Vec<CapabilityParameter>,
    pub agent_name: String,
}

impl Capability {
    pub fn required_parameters(&self) -> impl Iterator<Item = &CapabilityParameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    pub fn parameter(&self, name: &str) -> Option<&CapabilityParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Kind of a discovered record: an autonomous agent, or a stateless tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Agent,
    Tool,
}

/// Health as last observed by the Catalog's refresh loop or an explicit probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

/// A discovered agent or tool, owned by the Catalog and replaced wholesale on
/// each refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub address: String,
    pub port: u16,
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub health: Health,
}

impl AgentRecord {
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Flattened map of custom metadata attached to a planning request.
pub type RequestMetadata = HashMap<String, serde_json::Value>;
