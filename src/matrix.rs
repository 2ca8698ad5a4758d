//! Target lists from `catalog/targets.json`.
//!
//! Each entry names one build target in whichever form is handiest: a target
//! triple, raw predefined-macro tokens plus an OS, or explicit fields. Entries
//! are turned into descriptors through the classifier, so a typo surfaces as
//! the same typed error a single resolution would produce.

use crate::classifier::ArchitectureClassifier;
use crate::error::ResolutionError;
use crate::target::{ArchitectureFamily, OsFamily, TargetDescriptor};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const TARGETS_SCHEMA_VERSION: &str = "capgen_targets_v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Output name; defaults to the descriptor label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triple: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<ArchitectureFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl TargetSpec {
    pub fn triple(triple: &str) -> Self {
        Self {
            triple: Some(triple.to_string()),
            ..Self::default()
        }
    }

    pub fn descriptor(&self, classifier: &ArchitectureClassifier) -> Result<TargetDescriptor, ResolutionError> {
        match (&self.triple, &self.tokens, self.arch, self.os) {
            (Some(triple), None, None, None) => {
                let mut descriptor = TargetDescriptor::from_triple(classifier, triple)?;
                if self.variant.is_some() {
                    descriptor = TargetDescriptor::new(descriptor.arch, descriptor.os, self.variant.as_deref());
                }
                Ok(descriptor)
            }
            (Some(triple), ..) => Err(ResolutionError::UnsupportedTarget {
                input: triple.clone(),
                reason: "a triple cannot be combined with tokens, arch or os".to_string(),
            }),
            (None, Some(tokens), None, Some(os)) => {
                TargetDescriptor::from_tokens(classifier, tokens, os, self.variant.as_deref())
            }
            (None, Some(tokens), None, None) => Err(ResolutionError::UnsupportedTarget {
                input: tokens.join(","),
                reason: "token targets need an os".to_string(),
            }),
            (None, None, Some(arch), Some(os)) => {
                // Explicit families still have to be known to the classifier.
                classifier.classify_family(arch)?;
                Ok(TargetDescriptor::new(arch, os, self.variant.as_deref()))
            }
            _ => Err(ResolutionError::UnsupportedTarget {
                input: self.describe(),
                reason: "expected a triple, tokens with os, or arch with os".to_string(),
            }),
        }
    }

    /// Output name for a resolved descriptor.
    pub fn label(&self, descriptor: &TargetDescriptor) -> String {
        self.name.clone().unwrap_or_else(|| descriptor.label())
    }

    fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "<target>".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TargetsFile {
    schema_version: String,
    targets: Vec<TargetSpec>,
}

/// Load the target list, rejecting empty lists and duplicate explicit names.
pub fn load_targets(path: &Path) -> Result<Vec<TargetSpec>> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading targets {}", path.display()))?;
    let file: TargetsFile = serde_json::from_str(&data)
        .with_context(|| format!("parsing targets {}", path.display()))?;
    if file.schema_version != TARGETS_SCHEMA_VERSION {
        bail!(
            "targets {} declare schema_version '{}', expected '{}'",
            path.display(),
            file.schema_version,
            TARGETS_SCHEMA_VERSION
        );
    }
    if file.targets.is_empty() {
        bail!("targets {} list no targets", path.display());
    }

    let mut names = BTreeSet::new();
    for spec in &file.targets {
        if let Some(name) = &spec.name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                bail!("target name '{name}' is not usable as a file name");
            }
            if !names.insert(name.as_str()) {
                bail!("duplicate target name {name}");
            }
        }
    }
    Ok(file.targets)
}
