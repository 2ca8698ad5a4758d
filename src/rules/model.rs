use crate::registry::{FlagName, FlagValue};
use crate::target::{ArchitectureFamily, OsFamily, TargetDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an assignment interacts with values already in the working table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignMode {
    /// Non-override: conflicts with a different non-override value.
    #[default]
    Set,
    /// Replaces whatever was there; the last override wins.
    Override,
    /// Guarded default: ignored when any other source already produced a value.
    IfAbsent,
}

impl AssignMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignMode::Set => "set",
            AssignMode::Override => "override",
            AssignMode::IfAbsent => "if_absent",
        }
    }
}

/// Explicit per-flag assignment; `mode` falls back to the rule's mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub flag: FlagName,
    /// `null` removes the flag (resolves to undefined).
    pub value: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AssignMode>,
    /// Comment lines emitted above the flag when this assignment wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Assignment with its effective mode, as handed to the resolver.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveAssignment<'a> {
    pub flag: &'a FlagName,
    pub value: Option<&'a FlagValue>,
    pub mode: AssignMode,
    pub notes: &'a [String],
}

/// Conjunction of optional constraints over a target; empty matches anything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<Vec<ArchitectureFamily>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Vec<OsFamily>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posix_like: Option<bool>,
}

impl TargetPredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn posix_like() -> Self {
        Self {
            posix_like: Some(true),
            ..Self::default()
        }
    }

    pub fn os(families: &[OsFamily]) -> Self {
        Self {
            os: Some(families.to_vec()),
            ..Self::default()
        }
    }

    pub fn arch(mut self, families: &[ArchitectureFamily]) -> Self {
        self.arch = Some(families.to_vec());
        self
    }

    pub fn variant(mut self, variants: &[&str]) -> Self {
        self.variant = Some(variants.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn matches(&self, target: &TargetDescriptor) -> bool {
        if let Some(arch) = &self.arch {
            if !arch.contains(&target.arch) {
                return false;
            }
        }
        if let Some(os) = &self.os {
            if !os.contains(&target.os) {
                return false;
            }
        }
        if let Some(variants) = &self.variant {
            match &target.variant {
                Some(variant) if variants.iter().any(|v| v == variant) => {}
                _ => return false,
            }
        }
        if let Some(posix_like) = self.posix_like {
            if target.os.is_posix_like() != posix_like {
                return false;
            }
        }
        true
    }
}

/// One predicate-guarded group of assignments.
///
/// Identity is the rule's position in its set; `id` exists for diagnostics.
/// `set` entries use the rule-level `mode`; `assign` entries may override it
/// individually.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub when: TargetPredicate,
    #[serde(default)]
    pub mode: AssignMode,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<FlagName, Option<FlagValue>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assign: Vec<Assignment>,
}

impl Rule {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            description: None,
            when: TargetPredicate::any(),
            mode: AssignMode::Set,
            set: BTreeMap::new(),
            assign: Vec::new(),
        }
    }

    pub fn when(mut self, predicate: TargetPredicate) -> Self {
        self.when = predicate;
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Rule-level mode, e.g. `AssignMode::IfAbsent` for a block of guarded defaults.
    pub fn mode(mut self, mode: AssignMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set(mut self, flag: &str, value: impl Into<FlagValue>) -> Self {
        self.set.insert(FlagName::from(flag), Some(value.into()));
        self
    }

    pub fn overriding(self, flag: &str, value: impl Into<FlagValue>) -> Self {
        self.push(flag, Some(value.into()), AssignMode::Override)
    }

    pub fn if_absent(self, flag: &str, value: impl Into<FlagValue>) -> Self {
        self.push(flag, Some(value.into()), AssignMode::IfAbsent)
    }

    /// Override the flag to undefined.
    pub fn remove(self, flag: &str) -> Self {
        self.push(flag, None, AssignMode::Override)
    }

    /// Attach comment lines to the most recent `assign` entry.
    pub fn note(mut self, lines: &[&str]) -> Self {
        if let Some(last) = self.assign.last_mut() {
            last.notes = lines.iter().map(|line| line.to_string()).collect();
        }
        self
    }

    fn push(mut self, flag: &str, value: Option<FlagValue>, mode: AssignMode) -> Self {
        self.assign.push(Assignment {
            flag: FlagName::from(flag),
            value,
            mode: Some(mode),
            notes: Vec::new(),
        });
        self
    }

    pub fn matches(&self, target: &TargetDescriptor) -> bool {
        self.when.matches(target)
    }

    /// Assignments in application order: `set` (by name) then `assign` (as written).
    pub fn assignments(&self) -> impl Iterator<Item = EffectiveAssignment<'_>> {
        let rule_mode = self.mode;
        let set = self.set.iter().map(move |(flag, value)| EffectiveAssignment {
            flag,
            value: value.as_ref(),
            mode: rule_mode,
            notes: &[],
        });
        let assign = self.assign.iter().map(move |a| EffectiveAssignment {
            flag: &a.flag,
            value: a.value.as_ref(),
            mode: a.mode.unwrap_or(rule_mode),
            notes: &a.notes,
        });
        set.chain(assign)
    }

    /// Every flag the rule mentions.
    pub fn flags(&self) -> impl Iterator<Item = &FlagName> {
        self.set.keys().chain(self.assign.iter().map(|a| &a.flag))
    }
}
