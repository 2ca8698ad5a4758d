//! Target descriptors: which architecture, OS family, and vendor variant a
//! resolution is for.
//!
//! Descriptors are built from explicit fields, from a target triple, or from
//! raw predefined-macro tokens. Unknown architectures and OS families are
//! errors, never silently mapped to a known one.

use crate::classifier::{ArchitectureClassifier, triple_arch_token};
use crate::error::ResolutionError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchitectureFamily {
    X86,
    Amd64,
    Armv7,
    Aarch64,
}

impl ArchitectureFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchitectureFamily::X86 => "x86",
            ArchitectureFamily::Amd64 => "amd64",
            ArchitectureFamily::Armv7 => "armv7",
            ArchitectureFamily::Aarch64 => "aarch64",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x86" => Some(ArchitectureFamily::X86),
            "amd64" => Some(ArchitectureFamily::Amd64),
            "armv7" => Some(ArchitectureFamily::Armv7),
            "aarch64" => Some(ArchitectureFamily::Aarch64),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Qnx,
    Linux,
    Android,
    Darwin,
    Freebsd,
    Windows,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Qnx => "qnx",
            OsFamily::Linux => "linux",
            OsFamily::Android => "android",
            OsFamily::Darwin => "darwin",
            OsFamily::Freebsd => "freebsd",
            OsFamily::Windows => "windows",
        }
    }

    /// Accepts family names plus the spellings used in triples and `uname -s`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "qnx" | "nto" => Some(OsFamily::Qnx),
            "linux" => Some(OsFamily::Linux),
            "android" => Some(OsFamily::Android),
            "darwin" | "macos" | "ios" => Some(OsFamily::Darwin),
            "freebsd" => Some(OsFamily::Freebsd),
            "windows" | "win32" => Some(OsFamily::Windows),
            _ => None,
        }
    }

    pub fn is_posix_like(&self) -> bool {
        !matches!(self, OsFamily::Windows)
    }
}

/// Immutable identity of one compilation target.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub arch: ArchitectureFamily,
    pub os: OsFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl TargetDescriptor {
    pub fn new(arch: ArchitectureFamily, os: OsFamily, variant: Option<&str>) -> Self {
        Self {
            arch,
            os,
            variant: variant
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }
    }

    /// Build from predefined-macro tokens plus an OS family.
    pub fn from_tokens<I, S>(
        classifier: &ArchitectureClassifier,
        tokens: I,
        os: OsFamily,
        variant: Option<&str>,
    ) -> Result<Self, ResolutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classification = classifier.classify(tokens)?;
        Ok(Self::new(classification.family, os, variant))
    }

    /// Build from a target triple such as `aarch64-unknown-nto-qnx710`.
    ///
    /// The architecture component goes through the classifier; the OS is the
    /// first recognised component after it, and any component after the OS
    /// becomes the variant.
    pub fn from_triple(classifier: &ArchitectureClassifier, triple: &str) -> Result<Self, ResolutionError> {
        let parts: Vec<&str> = triple.trim().split('-').filter(|p| !p.is_empty()).collect();
        let Some((arch_part, rest)) = parts.split_first() else {
            return Err(ResolutionError::unsupported_target(triple, "empty triple"));
        };
        if rest.is_empty() {
            return Err(ResolutionError::unsupported_target(
                triple,
                "triple has no OS component",
            ));
        }

        let classification = classifier.classify([triple_arch_token(arch_part)])?;

        let os_position = rest
            .iter()
            .position(|part| os_from_triple_part(part).is_some())
            .ok_or_else(|| ResolutionError::unsupported_target(triple, "unrecognised OS family"))?;
        let os_part = rest[os_position];
        let mut os = os_from_triple_part(os_part)
            .ok_or_else(|| ResolutionError::unsupported_target(triple, "unrecognised OS family"))?;

        let mut variant = rest.get(os_position + 1).map(|s| s.to_string());
        if let Some(qnx_release) = os_part.strip_prefix("qnx").filter(|v| !v.is_empty()) {
            variant = Some(format!("qnx{qnx_release}"));
        }
        if os == OsFamily::Linux && variant.as_deref().is_some_and(|v| v.starts_with("android")) {
            os = OsFamily::Android;
            variant = None;
        }

        Ok(Self::new(classification.family, os, variant.as_deref()))
    }

    /// Canonical short name, also used for emitted file names.
    pub fn label(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}-{}-{}", self.arch.as_str(), self.os.as_str(), variant),
            None => format!("{}-{}", self.arch.as_str(), self.os.as_str()),
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn os_from_triple_part(part: &str) -> Option<OsFamily> {
    if part.starts_with("qnx") {
        return Some(OsFamily::Qnx);
    }
    if let Some(os) = OsFamily::parse(part) {
        return Some(os);
    }
    if part.starts_with("darwin") || part.starts_with("macos") || part.starts_with("ios") {
        return Some(OsFamily::Darwin);
    }
    if part.starts_with("freebsd") {
        return Some(OsFamily::Freebsd);
    }
    if part.starts_with("mingw") || part.starts_with("cygwin") {
        return Some(OsFamily::Windows);
    }
    None
}
