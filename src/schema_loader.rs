//! Shared JSON Schema loader for the registry and rule-set contracts.
//!
//! Both data files carry a `schema_version` string. The loader reads the schema
//! that sits beside the data (`<root>/schema/…`), falls back to the copy in the
//! crate, enforces the allowed version set, patches the schema's
//! `schema_version` const to the version being loaded, and compiles a
//! validator.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Result of loading and compiling a JSON Schema.
pub(crate) struct SchemaLoadResult {
    pub schema_version: String,
    pub compiled: JSONSchema,
}

/// Controls how schemas are loaded and normalized before compilation.
pub(crate) struct SchemaLoadOptions<'a> {
    /// Where to find the schema_version const inside the schema payload.
    pub schema_version_pointer: &'a str,
    /// Version declared by the instance; replaces the schema's const when set.
    pub expected_version: Option<&'a str>,
    /// Allowed schema_version values; enforced when present.
    pub allowed_versions: Option<&'a BTreeSet<String>>,
}

impl Default for SchemaLoadOptions<'_> {
    fn default() -> Self {
        Self {
            schema_version_pointer: "/properties/schema_version/const",
            expected_version: None,
            allowed_versions: None,
        }
    }
}

pub(crate) fn load_json_schema(path: &Path, options: SchemaLoadOptions<'_>) -> Result<SchemaLoadResult> {
    let mut schema_value: Value = serde_json::from_reader(BufReader::new(
        File::open(path).with_context(|| format!("opening schema {}", path.display()))?,
    ))
    .with_context(|| format!("parsing schema {}", path.display()))?;

    let schema_version = match options.expected_version {
        Some(version) => version.to_string(),
        None => extract_schema_version(&schema_value, options.schema_version_pointer)
            .ok_or_else(|| anyhow!("schema {} missing schema_version const", path.display()))?,
    };

    if let Some(allowed) = options.allowed_versions {
        if !allowed.contains(&schema_version) {
            bail!(
                "schema_version '{}' not in allowed set {:?}",
                schema_version,
                allowed
            );
        }
    }

    let target = schema_value
        .pointer_mut(options.schema_version_pointer)
        .ok_or_else(|| {
            anyhow!(
                "schema {} missing pointer {} for schema_version const",
                path.display(),
                options.schema_version_pointer
            )
        })?;
    *target = Value::String(schema_version.clone());

    let compiled = JSONSchema::compile(&schema_value)
        .map_err(|err| anyhow!("compiling schema {}: {err}", path.display()))?;

    Ok(SchemaLoadResult {
        schema_version,
        compiled,
    })
}

/// Validate `instance` and fold every schema error into one message.
pub(crate) fn validate_instance(
    schema: &SchemaLoadResult,
    instance: &Value,
    label: &str,
) -> Result<()> {
    if let Err(errors) = schema.compiled.validate(instance) {
        let details = errors
            .map(|err| format!("{} at {}", err, err.instance_path))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("{label} failed schema validation:\n{details}");
    }
    Ok(())
}

/// Locate `schema/<file_name>` for a data file under `<root>/catalog/`.
///
/// A schema next to the data wins so forks can evolve their contract; the copy
/// shipped with the crate is the fallback.
pub(crate) fn resolve_schema_path(data_path: &Path, file_name: &str) -> PathBuf {
    if let Some(base) = data_path.parent().and_then(|p| p.parent()) {
        let candidate = base.join("schema").join(file_name);
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("schema")
        .join(file_name)
}

/// Reject version strings that could not appear in a schema key.
pub(crate) fn validate_version_token(label: &str, version: &str) -> Result<()> {
    if version.is_empty() {
        bail!("{label} must not be empty");
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        bail!("{label} must match ^[A-Za-z0-9_.-]+$, got {version}");
    }
    Ok(())
}

fn extract_schema_version(schema: &Value, pointer: &str) -> Option<String> {
    let version = schema.pointer(pointer).and_then(Value::as_str)?;
    if version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        Some(version.to_string())
    } else {
        None
    }
}
