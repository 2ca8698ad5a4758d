//! Validated, indexed view of a capability registry.
//!
//! The registry keeps flags in declaration order (the emitter's ordering key)
//! and an index by name for lookups. Loading is strict: duplicate names,
//! unknown groups, defaults outside their domain, and unexpected schema
//! versions are all rejected so a resolver never runs against a broken catalog.

use crate::registry::identity::{FlagGroup, FlagName, FlagValue, RegistryKey};
use crate::registry::model::{CapabilityFlag, GroupSpec, RegistryFile, load_registry_from_path};
use crate::schema_loader::{
    SchemaLoadOptions, load_json_schema, resolve_schema_path, validate_instance,
    validate_version_token,
};
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const REGISTRY_SCHEMA_VERSION: &str = "capgen_registry_v1";
const REGISTRY_SCHEMA_FILE: &str = "registry.schema.json";

#[derive(Debug, Clone)]
/// Immutable catalog of capability flags.
pub struct CapabilityRegistry {
    key: RegistryKey,
    groups: Vec<GroupSpec>,
    flags: Vec<CapabilityFlag>,
    by_name: BTreeMap<FlagName, usize>,
}

impl CapabilityRegistry {
    /// Load and validate a registry from disk.
    pub fn load(path: &Path) -> Result<Self> {
        validate_against_schema(path)?;
        let file = load_registry_from_path(path)?;
        if file.schema_version != REGISTRY_SCHEMA_VERSION {
            bail!(
                "registry {} declares schema_version '{}', expected '{}'",
                path.display(),
                file.schema_version,
                REGISTRY_SCHEMA_VERSION
            );
        }
        Self::from_file(file).with_context(|| format!("validating registry {}", path.display()))
    }

    pub fn from_file(file: RegistryFile) -> Result<Self> {
        Self::new(file.key, file.groups, file.flags)
    }

    /// Build a registry in code.
    pub fn new(key: RegistryKey, groups: Vec<GroupSpec>, flags: Vec<CapabilityFlag>) -> Result<Self> {
        validate_version_token("registry key", &key.0)?;
        let by_name = build_index(&groups, &flags)?;
        Ok(Self {
            key,
            groups,
            flags,
            by_name,
        })
    }

    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    /// Resolve a flag by name.
    pub fn flag(&self, name: &FlagName) -> Option<&CapabilityFlag> {
        self.by_name.get(name).map(|&idx| &self.flags[idx])
    }

    /// Declaration position of a flag.
    pub fn position(&self, name: &FlagName) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &FlagName) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registry default for a flag that no rule addressed.
    pub fn default_of(&self, name: &FlagName) -> Option<&FlagValue> {
        self.flag(name)?.default.as_ref()
    }

    /// Flags in declaration order.
    pub fn flags(&self) -> impl Iterator<Item = &CapabilityFlag> {
        self.flags.iter()
    }

    /// Groups in emission order.
    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }

    /// Flags of one group, in declaration order.
    pub fn flags_in<'a>(&'a self, group: &'a FlagGroup) -> impl Iterator<Item = &'a CapabilityFlag> {
        self.flags.iter().filter(move |flag| &flag.group == group)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

fn build_index(groups: &[GroupSpec], flags: &[CapabilityFlag]) -> Result<BTreeMap<FlagName, usize>> {
    if flags.is_empty() {
        bail!("registry contains no flags");
    }

    let mut group_ids: BTreeSet<&FlagGroup> = BTreeSet::new();
    for group in groups {
        if !group_ids.insert(&group.id) {
            bail!("duplicate group id {}", group.id.as_str());
        }
        if let Some(title) = &group.title {
            if title.trim().is_empty() || title.contains('\n') {
                bail!("group {} has an unusable title", group.id.as_str());
            }
        }
    }

    let mut map = BTreeMap::new();
    for (idx, flag) in flags.iter().enumerate() {
        if !flag.name.is_valid() {
            bail!("flag name '{}' is not a C identifier", flag.name);
        }
        if map.insert(flag.name.clone(), idx).is_some() {
            bail!("duplicate flag {}", flag.name);
        }
        if !group_ids.contains(&flag.group) {
            bail!(
                "flag {} references unknown group {}",
                flag.name,
                flag.group.as_str()
            );
        }
        if flag.rationale.trim().is_empty() {
            bail!("flag {} has no rationale", flag.name);
        }
        if let Some(default) = &flag.default {
            if !default.satisfies(flag.domain) {
                bail!(
                    "flag {} declares default {} outside its {} domain",
                    flag.name,
                    default,
                    flag.domain
                );
            }
        }
    }
    Ok(map)
}

fn validate_against_schema(registry_path: &Path) -> Result<()> {
    let registry_file = File::open(registry_path)
        .with_context(|| format!("opening registry {}", registry_path.display()))?;
    let registry_value: Value = serde_json::from_reader(BufReader::new(registry_file))
        .with_context(|| format!("parsing registry {}", registry_path.display()))?;

    let declared = registry_value
        .get("schema_version")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    validate_version_token("schema_version", &declared)?;

    let allowed = BTreeSet::from([REGISTRY_SCHEMA_VERSION.to_string()]);
    let schema_path = resolve_schema_path(registry_path, REGISTRY_SCHEMA_FILE);
    let schema = load_json_schema(
        &schema_path,
        SchemaLoadOptions {
            allowed_versions: Some(&allowed),
            expected_version: Some(&declared),
            ..Default::default()
        },
    )
    .with_context(|| format!("loading registry schema {}", schema_path.display()))?;

    validate_instance(
        &schema,
        &registry_value,
        &format!("capability registry {}", registry_path.display()),
    )
}
