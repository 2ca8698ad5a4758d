//! Ordered rule collections loaded from `catalog/rules.json`.
//!
//! Declaration order is semantically significant: it decides which assignment
//! arrives first and therefore which site a conflict names. Loading validates
//! the file against `schema/rules.schema.json` and rejects duplicate rule ids.

use crate::registry::{CapabilityRegistry, FlagName};
use crate::rules::model::{AssignMode, Rule};
use crate::schema_loader::{
    SchemaLoadOptions, load_json_schema, resolve_schema_path, validate_instance,
    validate_version_token,
};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub const RULES_SCHEMA_VERSION: &str = "capgen_rules_v1";
const RULES_SCHEMA_FILE: &str = "rules.schema.json";

#[derive(Debug, Deserialize)]
struct RuleSetFile {
    schema_version: String,
    #[serde(default)]
    description: Option<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    description: Option<String>,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build from rules in declaration order; ids must be unique.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for rule in &rules {
            if rule.id.trim().is_empty() {
                bail!("encountered rule with no id");
            }
            if !seen.insert(rule.id.as_str()) {
                bail!("duplicate rule id {}", rule.id);
            }
            for assignment in &rule.assign {
                for line in &assignment.notes {
                    if line.contains(['\n', '\r']) || line.ends_with('\\') {
                        bail!(
                            "rule {} has a note on {} that does not fit on one comment line: {:?}",
                            rule.id,
                            assignment.flag,
                            line
                        );
                    }
                }
            }
        }
        Ok(Self {
            description: None,
            rules,
        })
    }

    /// Load and validate a rule set from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            fs::read_to_string(path).with_context(|| format!("reading rules {}", path.display()))?;
        let value: Value = serde_json::from_str(&data)
            .with_context(|| format!("parsing rules {}", path.display()))?;
        validate_against_schema(path, &value)?;

        let file: RuleSetFile = serde_json::from_value(value)
            .with_context(|| format!("decoding rules {}", path.display()))?;
        if file.schema_version != RULES_SCHEMA_VERSION {
            bail!(
                "rules {} declare schema_version '{}', expected '{}'",
                path.display(),
                file.schema_version,
                RULES_SCHEMA_VERSION
            );
        }
        let mut set = Self::new(file.rules).with_context(|| format!("validating rules {}", path.display()))?;
        set.description = file.description;
        Ok(set)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Static cross-check against a registry.
    ///
    /// Returns every problem instead of stopping at the first one: unknown
    /// flags, values outside the declared domain, and the same flag appearing
    /// twice inside one rule. Resolution would catch most of these too, but
    /// only for targets a rule actually matches.
    pub fn lint(&self, registry: &CapabilityRegistry) -> Vec<String> {
        let mut errors = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            let mut modes_by_flag: BTreeMap<&FlagName, Vec<AssignMode>> = BTreeMap::new();
            for assignment in rule.assignments() {
                modes_by_flag
                    .entry(assignment.flag)
                    .or_default()
                    .push(assignment.mode);
                let Some(flag) = registry.flag(assignment.flag) else {
                    errors.push(format!(
                        "rule #{index} ({}) references unknown flag {}",
                        rule.id, assignment.flag
                    ));
                    continue;
                };
                if let Some(value) = assignment.value {
                    if !value.satisfies(flag.domain) {
                        errors.push(format!(
                            "rule #{index} ({}) assigns {} to {} which is declared {}",
                            rule.id, value, flag.name, flag.domain
                        ));
                    }
                }
            }
            for (flag, modes) in modes_by_flag {
                if modes.len() > 1 {
                    errors.push(format!(
                        "rule #{index} ({}) assigns {} {} times",
                        rule.id,
                        flag,
                        modes.len()
                    ));
                }
            }
        }
        errors
    }
}

impl FromIterator<Rule> for RuleSet {
    /// Collects without the duplicate-id check; use [`RuleSet::new`] for untrusted input.
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self {
            description: None,
            rules: iter.into_iter().collect(),
        }
    }
}

fn validate_against_schema(rules_path: &Path, value: &Value) -> Result<()> {
    let declared = value
        .get("schema_version")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    validate_version_token("schema_version", &declared)?;

    let allowed = BTreeSet::from([RULES_SCHEMA_VERSION.to_string()]);
    let schema_path = resolve_schema_path(rules_path, RULES_SCHEMA_FILE);
    let schema = load_json_schema(
        &schema_path,
        SchemaLoadOptions {
            allowed_versions: Some(&allowed),
            expected_version: Some(&declared),
            ..Default::default()
        },
    )
    .with_context(|| format!("loading rules schema {}", schema_path.display()))?;

    validate_instance(&schema, value, &format!("rule set {}", rules_path.display()))
}
