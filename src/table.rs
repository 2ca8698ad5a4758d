//! Resolved capability tables.

use crate::error::AssignmentSite;
use crate::registry::{FlagName, FlagValue, RegistryKey};
use crate::target::TargetDescriptor;
use serde::Serialize;

/// Final state of one flag after resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFlag {
    pub name: FlagName,
    /// `None` is undefined: the flag was addressed and then removed.
    pub value: Option<FlagValue>,
    /// Site whose value won.
    pub site: AssignmentSite,
    /// Non-override site displaced by an override, kept for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<AssignmentSite>,
    /// Came from a guarded default or a seed; emitted inside `#ifndef`.
    pub guarded: bool,
    /// Comment lines written above the flag in the header.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ResolvedFlag {
    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }
}

/// Immutable result of resolving one target.
///
/// Entries follow registry declaration order and cover exactly the flags that
/// the classifier or a matching rule addressed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityTable {
    pub target: TargetDescriptor,
    pub registry: RegistryKey,
    entries: Vec<ResolvedFlag>,
}

impl CapabilityTable {
    pub(crate) fn new(target: TargetDescriptor, registry: RegistryKey, entries: Vec<ResolvedFlag>) -> Self {
        Self {
            target,
            registry,
            entries,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedFlag> {
        self.entries.iter().find(|entry| entry.name.as_str() == name)
    }

    /// Defined value of a flag; `None` when unaddressed or removed.
    pub fn value(&self, name: &str) -> Option<&FlagValue> {
        self.get(name)?.value.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn entries(&self) -> &[ResolvedFlag] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
