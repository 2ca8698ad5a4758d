//! Platform capability resolution for portability-layer config headers.
//!
//! A [`CapabilityRegistry`] declares every flag a portability layer may test.
//! A [`RuleSet`] says which flags each target gets. The [`Resolver`] folds the
//! rules over a [`TargetDescriptor`] into an immutable [`CapabilityTable`], and
//! the [`HeaderEmitter`] renders that table as a C preprocessor header.
//!
//! Public functions here form the contract the helper binaries depend on:
//! repository discovery, catalog path resolution, and small parsing helpers.

use anyhow::{Result, bail};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub mod classifier;
pub mod emitter;
pub mod error;
pub mod host;
pub mod matrix;
pub mod registry;
pub mod resolver;
pub mod rules;
mod schema_loader;
pub mod seed;
pub mod table;
pub mod target;

pub use classifier::{ArchPredicate, ArchitectureClassifier, Classification, triple_arch_token};
pub use emitter::{EmitOptions, HeaderEmitter, render_value, write_atomically};
pub use error::{AssignmentSite, ResolutionError};
pub use host::HostInfo;
pub use matrix::{TargetSpec, load_targets};
pub use registry::{
    CapabilityFlag, CapabilityRegistry, FlagGroup, FlagName, FlagValue, GroupSpec, RegistryKey,
    Rendering, ValueDomain,
};
pub use resolver::{Resolver, resolve};
pub use rules::{AssignMode, Rule, RuleSet, TargetPredicate};
pub use seed::SeedMap;
pub use table::{CapabilityTable, ResolvedFlag};
pub use target::{ArchitectureFamily, OsFamily, TargetDescriptor};

const REGISTRY_FILE: &str = "catalog/registry.json";
const RULES_FILE: &str = "catalog/rules.json";
const TARGETS_FILE: &str = "catalog/targets.json";
const ROOT_SENTINELS: [&str; 2] = [REGISTRY_FILE, "schema/registry.schema.json"];

/// Returns true when `candidate` holds the shipped catalog and its schemas.
fn is_repo_root(candidate: &Path) -> bool {
    ROOT_SENTINELS
        .iter()
        .all(|sentinel| candidate.join(sentinel).is_file())
}

fn repo_root_from_hint(hint: &str) -> Option<PathBuf> {
    if hint.is_empty() {
        return None;
    }
    let hint_path = PathBuf::from(hint);
    if !hint_path.exists() || !is_repo_root(&hint_path) {
        return None;
    }
    fs::canonicalize(hint_path).ok()
}

fn search_upwards(start: &Path) -> Option<PathBuf> {
    let mut dir = fs::canonicalize(start).ok()?;
    loop {
        if is_repo_root(&dir) {
            return Some(dir);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

/// Locate the repository root holding `catalog/` and `schema/`.
///
/// Search order: `CAPGEN_ROOT` if it points at a real checkout, then climbing
/// up from the current executable, then the build-time hint.
pub fn find_repo_root() -> Result<PathBuf> {
    if let Ok(env_root) = env::var("CAPGEN_ROOT") {
        if let Some(root) = repo_root_from_hint(&env_root) {
            return Ok(root);
        }
    }

    if let Ok(exe_path) = env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            if let Some(root) = search_upwards(exe_dir) {
                return Ok(root);
            }
        }
    }

    if let Some(hint) = option_env!("CAPGEN_ROOT_HINT") {
        if let Some(root) = repo_root_from_hint(hint) {
            return Ok(root);
        }
    }

    bail!("Unable to locate the capgen catalog. Set CAPGEN_ROOT to the repository checkout.");
}

/// Data files under `catalog/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFile {
    Registry,
    Rules,
    Targets,
}

impl CatalogFile {
    /// Path relative to the repository root.
    pub fn relative_path(&self) -> &'static str {
        match self {
            CatalogFile::Registry => REGISTRY_FILE,
            CatalogFile::Rules => RULES_FILE,
            CatalogFile::Targets => TARGETS_FILE,
        }
    }

    pub fn env_var(&self) -> &'static str {
        match self {
            CatalogFile::Registry => "CAPGEN_REGISTRY",
            CatalogFile::Rules => "CAPGEN_RULES",
            CatalogFile::Targets => "CAPGEN_TARGETS",
        }
    }
}

/// Resolve a data file from its CLI flag, then its environment variable, then
/// the discovered repository. The repository is only searched for when neither
/// override is present.
pub fn resolve_catalog_path(file: CatalogFile, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path(file.env_var()) {
        return Ok(path);
    }
    Ok(find_repo_root()?.join(file.relative_path()))
}

fn env_path(name: &str) -> Option<PathBuf> {
    env_non_empty(name).map(PathBuf::from)
}

/// Environment variable value, treating empty as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Split comma- or whitespace-delimited lists into tokens.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .replace(',', " ")
        .split_whitespace()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
