//! Architecture classification from compiler-predefined identity tokens.
//!
//! The classifier is an ordered list of predicates. The first predicate with
//! an indicator present in the token set wins, so overlapping sets resolve the
//! same way an `#if/#elif` chain would. A token set that matches nothing is an
//! error; there is no default architecture.

use crate::error::ResolutionError;
use crate::registry::{FlagName, FlagValue};
use crate::target::ArchitectureFamily;
use serde::Serialize;
use std::collections::BTreeSet;

/// One arm of the architecture chain.
#[derive(Debug, Clone, Serialize)]
pub struct ArchPredicate {
    pub family: ArchitectureFamily,
    /// Predefined macros that identify the family; any one is enough.
    pub indicators: Vec<String>,
    /// Definitional flags that always accompany the family.
    pub implied: Vec<(FlagName, FlagValue)>,
}

impl ArchPredicate {
    pub fn new(family: ArchitectureFamily, indicators: &[&str]) -> Self {
        Self {
            family,
            indicators: indicators.iter().map(|s| s.to_string()).collect(),
            implied: Vec::new(),
        }
    }

    pub fn implies(mut self, name: &str, value: impl Into<FlagValue>) -> Self {
        self.implied.push((FlagName::from(name), value.into()));
        self
    }

    fn matching_indicator(&self, tokens: &BTreeSet<&str>) -> Option<&str> {
        self.indicators
            .iter()
            .map(String::as_str)
            .find(|indicator| tokens.contains(indicator))
    }
}

/// Outcome of a successful classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub family: ArchitectureFamily,
    /// The indicator that selected the family.
    pub indicator: String,
    pub implied: Vec<(FlagName, FlagValue)>,
}

#[derive(Debug, Clone)]
pub struct ArchitectureClassifier {
    predicates: Vec<ArchPredicate>,
}

impl Default for ArchitectureClassifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl ArchitectureClassifier {
    pub fn new(predicates: Vec<ArchPredicate>) -> Self {
        Self { predicates }
    }

    /// The x86 / amd64 / armv7 / aarch64 chain used by the shipped headers.
    pub fn standard() -> Self {
        Self::new(vec![
            ArchPredicate::new(ArchitectureFamily::X86, &["__i386__"])
                .implies("ARCHITECTURE_IS_X86", true),
            ArchPredicate::new(ArchitectureFamily::Amd64, &["__x86_64__"])
                .implies("ARCHITECTURE_IS_AMD64", true),
            ArchPredicate::new(ArchitectureFamily::Armv7, &["__arm__"])
                .implies("ARCHITECTURE_IS_ARMv7", true)
                .implies("ARM_FPU_VFP", true)
                .implies("HAVE_ARMV6", true),
            ArchPredicate::new(ArchitectureFamily::Aarch64, &["__aarch64__"])
                .implies("ARCHITECTURE_IS_AARCH64", true),
        ])
    }

    pub fn predicates(&self) -> &[ArchPredicate] {
        &self.predicates
    }

    /// First predicate declared for `family`.
    pub fn predicate_for(&self, family: ArchitectureFamily) -> Option<&ArchPredicate> {
        self.predicates.iter().find(|p| p.family == family)
    }

    /// Classify a raw token set.
    pub fn classify<I, S>(&self, tokens: I) -> Result<Classification, ResolutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let owned: Vec<String> = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let set: BTreeSet<&str> = owned.iter().map(String::as_str).collect();

        for predicate in &self.predicates {
            if let Some(indicator) = predicate.matching_indicator(&set) {
                log::debug!(
                    "classified tokens as {} via {indicator}",
                    predicate.family.as_str()
                );
                return Ok(Classification {
                    family: predicate.family,
                    indicator: indicator.to_string(),
                    implied: predicate.implied.clone(),
                });
            }
        }

        Err(ResolutionError::UnsupportedArchitecture {
            tokens: set.into_iter().map(str::to_string).collect(),
        })
    }

    /// Implied flags for an explicitly named family.
    ///
    /// Explicit descriptors skip token matching but still need the
    /// definitional flags; a family the classifier does not know is as
    /// unsupported as an unknown token set.
    pub fn classify_family(&self, family: ArchitectureFamily) -> Result<Classification, ResolutionError> {
        let predicate = self
            .predicate_for(family)
            .ok_or_else(|| ResolutionError::UnsupportedArchitecture {
                tokens: vec![family.as_str().to_string()],
            })?;
        Ok(Classification {
            family,
            indicator: predicate.indicators.first().cloned().unwrap_or_default(),
            implied: predicate.implied.clone(),
        })
    }
}

/// Map the architecture component of a target triple to a predefined macro.
///
/// Unknown components pass through unchanged so classification reports them.
pub fn triple_arch_token(component: &str) -> String {
    let lower = component.to_ascii_lowercase();
    let token = match lower.as_str() {
        "i386" | "i486" | "i586" | "i686" | "x86" => "__i386__",
        "x86_64" | "amd64" | "x64" => "__x86_64__",
        "aarch64" | "arm64" | "aarch64_be" => "__aarch64__",
        other if other.starts_with("armv7") || other.starts_with("thumbv7") => "__arm__",
        "arm" | "armv6" | "armel" | "armhf" | "armle" => "__arm__",
        _ => return component.to_string(),
    };
    token.to_string()
}
