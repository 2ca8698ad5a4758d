//! Deserializable representation of `catalog/registry.json`.
//!
//! The types mirror the registry schema. Use `CapabilityRegistry` for
//! validation and name lookup; use these structs when reading or building the
//! raw catalog.

use crate::registry::identity::{FlagGroup, FlagName, FlagValue, RegistryKey, Rendering, ValueDomain};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Deserialize)]
/// Full registry as stored on disk.
pub struct RegistryFile {
    pub schema_version: String,
    pub key: RegistryKey,
    #[serde(default)]
    pub description: Option<String>,
    pub groups: Vec<GroupSpec>,
    pub flags: Vec<CapabilityFlag>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// A section of the emitted artifact. Order in the registry is emission order.
pub struct GroupSpec {
    pub id: FlagGroup,
    /// Comment header written above the section; `None` writes only a blank line.
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// One known capability flag.
pub struct CapabilityFlag {
    pub name: FlagName,
    pub domain: ValueDomain,
    pub group: FlagGroup,
    /// Registry default; `None` means undefined, which is not the same as false.
    #[serde(default)]
    pub default: Option<FlagValue>,
    #[serde(default)]
    pub render: Rendering,
    pub rationale: String,
}

impl CapabilityFlag {
    pub fn new(name: &str, domain: ValueDomain, group: FlagGroup, rationale: &str) -> Self {
        Self {
            name: FlagName::from(name),
            domain,
            group,
            default: None,
            render: Rendering::default(),
            rationale: rationale.to_string(),
        }
    }

    pub fn with_default(mut self, value: impl Into<FlagValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn rendered(mut self, render: Rendering) -> Self {
        self.render = render;
        self
    }
}

/// Read and parse a registry from disk without additional validation.
pub fn load_registry_from_path(path: &Path) -> Result<RegistryFile> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading registry {}", path.display()))?;
    let registry: RegistryFile = serde_json::from_str(&data)
        .with_context(|| format!("parsing registry {}", path.display()))?;
    Ok(registry)
}
