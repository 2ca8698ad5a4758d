//! Host target detection.
//!
//! Reads `uname(2)` for the machine and system names and maps them onto the
//! classifier's indicator tokens and an OS family. When `uname` is unavailable
//! or reports something unrecognised, the compile-time `std::env::consts`
//! values are used instead.

use crate::classifier::{ArchitectureClassifier, triple_arch_token};
use crate::error::ResolutionError;
use crate::target::{OsFamily, TargetDescriptor};
use serde::Serialize;
use std::env;

/// What the running host looks like to the resolver.
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub machine: String,
    pub sysname: String,
    /// Indicator tokens derived from `machine`.
    pub tokens: Vec<String>,
    /// Source of the values: `uname` or `consts`.
    pub source: &'static str,
}

impl HostInfo {
    pub fn detect() -> Self {
        match uname() {
            Some((sysname, machine)) => Self::from_parts(&sysname, &machine, "uname"),
            None => Self::from_parts(fallback_sysname(), env::consts::ARCH, "consts"),
        }
    }

    fn from_parts(sysname: &str, machine: &str, source: &'static str) -> Self {
        Self {
            machine: machine.to_string(),
            sysname: sysname.to_string(),
            tokens: vec![triple_arch_token(machine)],
            source,
        }
    }

    pub fn os_family(&self) -> Option<OsFamily> {
        os_from_sysname(&self.sysname).or_else(|| OsFamily::parse(env::consts::OS))
    }

    /// Classify the host into a descriptor with no variant.
    pub fn descriptor(&self, classifier: &ArchitectureClassifier) -> Result<TargetDescriptor, ResolutionError> {
        let os = self.os_family().ok_or_else(|| {
            ResolutionError::UnsupportedTarget {
                input: self.sysname.clone(),
                reason: "unrecognised host operating system".to_string(),
            }
        })?;
        TargetDescriptor::from_tokens(classifier, &self.tokens, os, None)
    }
}

/// Map a `uname -s` system name to an OS family.
pub fn os_from_sysname(sysname: &str) -> Option<OsFamily> {
    let lower = sysname.trim().to_ascii_lowercase();
    match lower.as_str() {
        "qnx" | "nto" => Some(OsFamily::Qnx),
        "linux" => Some(OsFamily::Linux),
        "darwin" => Some(OsFamily::Darwin),
        "freebsd" => Some(OsFamily::Freebsd),
        other if other.starts_with("mingw") || other.starts_with("msys") || other.starts_with("cygwin") => {
            Some(OsFamily::Windows)
        }
        _ => None,
    }
}

fn fallback_sysname() -> &'static str {
    match env::consts::OS {
        "macos" | "ios" => "Darwin",
        "linux" | "android" => "Linux",
        "freebsd" => "FreeBSD",
        "nto" => "QNX",
        other => other,
    }
}

#[cfg(unix)]
fn uname() -> Option<(String, String)> {
    use std::ffi::CStr;

    let mut info: libc::utsname = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::uname(&mut info) };
    if rc != 0 {
        return None;
    }
    let sysname = unsafe { CStr::from_ptr(info.sysname.as_ptr()) }
        .to_string_lossy()
        .trim()
        .to_string();
    let machine = unsafe { CStr::from_ptr(info.machine.as_ptr()) }
        .to_string_lossy()
        .trim()
        .to_string();
    if sysname.is_empty() || machine.is_empty() {
        return None;
    }
    Some((sysname, machine))
}

#[cfg(not(unix))]
fn uname() -> Option<(String, String)> {
    None
}
