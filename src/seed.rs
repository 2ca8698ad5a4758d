//! Externally supplied pre-seed values.
//!
//! Seeds stand in for definitions the build system already provides (the
//! `#ifndef` case). They only influence guarded defaults: an `if_absent`
//! assignment for a seeded flag is a no-op and the seeded value is what the
//! table carries.
//!
//! Values are parsed loosely here and read in the flag's declared domain at
//! resolution time, so `HAVE_FOO=1` seeds a boolean flag as `true`.

use crate::registry::{FlagName, FlagValue};
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::env;

/// Environment prefix for seeds, e.g. `CAPGEN_SEED_PAGE_SIZE=0x4000`.
pub const SEED_ENV_PREFIX: &str = "CAPGEN_SEED_";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedMap {
    values: BTreeMap<FlagName, FlagValue>,
}

impl SeedMap {
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Collect `CAPGEN_SEED_<NAME>` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Same as [`SeedMap::from_env`] over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seeds = Self::new();
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(SEED_ENV_PREFIX) else {
                continue;
            };
            if name.is_empty() || value.trim().is_empty() {
                continue;
            }
            seeds.insert(FlagName::from(name), FlagValue::parse_loose(&value));
        }
        seeds
    }

    /// Parse a `NAME=VALUE` command-line seed.
    pub fn parse_assignment(raw: &str) -> Result<(FlagName, FlagValue)> {
        let Some((name, value)) = raw.split_once('=') else {
            bail!("seed '{raw}' must look like NAME=VALUE");
        };
        let name = FlagName::from(name.trim());
        if !name.is_valid() {
            bail!("seed name '{}' is not a C identifier", name);
        }
        if value.trim().is_empty() {
            bail!("seed {name} has an empty value");
        }
        Ok((name, FlagValue::parse_loose(value)))
    }

    pub fn insert(&mut self, name: FlagName, value: FlagValue) {
        self.values.insert(name, value);
    }

    /// Later maps win; used to layer command-line seeds over the environment.
    pub fn merge(&mut self, other: SeedMap) {
        self.values.extend(other.values);
    }

    pub fn get(&self, name: &FlagName) -> Option<&FlagValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &FlagName) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlagName, &FlagValue)> {
        self.values.iter()
    }
}

impl FromIterator<(FlagName, FlagValue)> for SeedMap {
    fn from_iter<I: IntoIterator<Item = (FlagName, FlagValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_with_prefix_become_seeds() {
        let seeds = SeedMap::from_vars([
            ("CAPGEN_SEED_PAGE_SIZE".to_string(), "0x4000".to_string()),
            ("CAPGEN_SEED_".to_string(), "1".to_string()),
            ("CAPGEN_SEED_EMPTY".to_string(), " ".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);
        assert_eq!(seeds.len(), 1);
        assert_eq!(
            seeds.get(&FlagName::from("PAGE_SIZE")),
            Some(&FlagValue::Int(0x4000))
        );
    }

    #[test]
    fn cli_assignments_are_checked() {
        let (name, value) = SeedMap::parse_assignment("HAVE_EPOLL=false").unwrap();
        assert_eq!(name.as_str(), "HAVE_EPOLL");
        assert_eq!(value, FlagValue::Bool(false));

        assert!(SeedMap::parse_assignment("HAVE_EPOLL").is_err());
        assert!(SeedMap::parse_assignment("HAVE-EPOLL=1").is_err());
        assert!(SeedMap::parse_assignment("HAVE_EPOLL=").is_err());
    }

    #[test]
    fn merge_prefers_later_values() {
        let mut base: SeedMap = [(FlagName::from("PAGE_SIZE"), FlagValue::Int(4096))]
            .into_iter()
            .collect();
        let cli: SeedMap = [(FlagName::from("PAGE_SIZE"), FlagValue::Int(16384))]
            .into_iter()
            .collect();
        base.merge(cli);
        assert_eq!(
            base.get(&FlagName::from("PAGE_SIZE")),
            Some(&FlagValue::Int(16384))
        );
    }
}
