//! Typed failures for classification and resolution.
//!
//! Every variant is fatal for the resolution that raised it: callers never get
//! a partial table back. Messages carry the flag, the assignment sites and the
//! target so a maintainer can locate the rule to fix.

use crate::registry::{FlagName, ValueDomain};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Where a value entered the working table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentSite {
    /// Definitional flag attached by the architecture classifier.
    Architecture,
    /// Externally supplied pre-seed value.
    Seed,
    /// Rule at `index` in declaration order.
    Rule { index: usize, id: String },
}

impl AssignmentSite {
    pub fn rule_index(&self) -> Option<usize> {
        match self {
            AssignmentSite::Rule { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for AssignmentSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentSite::Architecture => f.write_str("architecture classifier"),
            AssignmentSite::Seed => f.write_str("external seed"),
            AssignmentSite::Rule { index, id } => write!(f, "rule #{index} ({id})"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    #[error("unsupported architecture: no known predicate matches indicator tokens [{}]", .tokens.join(", "))]
    UnsupportedArchitecture { tokens: Vec<String> },

    #[error("unsupported target '{input}': {reason}")]
    UnsupportedTarget { input: String, reason: String },

    #[error("conflicting assignment for {flag} on {target}: {first} and {second} assert different values without override")]
    ConflictingAssignment {
        flag: FlagName,
        first: AssignmentSite,
        second: AssignmentSite,
        target: String,
    },

    #[error("domain violation for {flag} on {target}: expected {expected}, got {actual}")]
    DomainViolation {
        flag: FlagName,
        expected: ValueDomain,
        actual: String,
        target: String,
    },

    #[error("{site} may not change {flag} on {target}: the flag is defined by the architecture classifier")]
    DefinitionalFlag {
        flag: FlagName,
        site: AssignmentSite,
        target: String,
    },

    #[error("{site} assigns {flag} on {target}, but the registry does not declare it")]
    UnknownFlag {
        flag: FlagName,
        site: AssignmentSite,
        target: String,
    },
}

impl ResolutionError {
    pub(crate) fn unsupported_target(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedTarget {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Flag implicated by the failure, when there is one.
    pub fn flag(&self) -> Option<&FlagName> {
        match self {
            ResolutionError::ConflictingAssignment { flag, .. }
            | ResolutionError::DomainViolation { flag, .. }
            | ResolutionError::DefinitionalFlag { flag, .. }
            | ResolutionError::UnknownFlag { flag, .. } => Some(flag),
            _ => None,
        }
    }
}
