use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Versioned key for a capability registry (e.g., `il2cpp_mono_v1`).
///
/// Recorded on every resolved table so consumers know which catalog produced
/// the flag set.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryKey(pub String);

/// Preprocessor name of a capability flag (`HAVE_MMAP`, `PAGE_SIZE`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagName(pub String);

impl FlagName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Flag names must be usable as C macro identifiers.
    pub fn is_valid(&self) -> bool {
        is_c_identifier(&self.0)
    }
}

impl From<&str> for FlagName {
    fn from(value: &str) -> Self {
        FlagName(value.to_string())
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn is_c_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Declared value domain of a flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueDomain {
    Boolean,
    Integer,
    StringLiteral,
    /// Another macro or identifier, emitted unquoted (`S_IWRITE S_IWUSR`).
    Symbol,
}

impl ValueDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueDomain::Boolean => "boolean",
            ValueDomain::Integer => "integer",
            ValueDomain::StringLiteral => "string_literal",
            ValueDomain::Symbol => "symbol",
        }
    }
}

impl fmt::Display for ValueDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete value assigned to a flag.
///
/// Resolution works with `Option<FlagValue>`: `None` is the "undefined" state
/// produced by an explicit removal, which is distinct from `Bool(false)`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlagValue {
    /// Whether the value lies inside `domain`.
    pub fn satisfies(&self, domain: ValueDomain) -> bool {
        match (self, domain) {
            (FlagValue::Bool(_), ValueDomain::Boolean) => true,
            (FlagValue::Int(_), ValueDomain::Integer) => true,
            (FlagValue::Text(_), ValueDomain::StringLiteral) => true,
            (FlagValue::Text(text), ValueDomain::Symbol) => is_c_identifier(text),
            _ => false,
        }
    }

    /// Parse a loosely typed value from the command line or environment.
    ///
    /// `true`/`false` become booleans, decimal or `0x` hex become integers,
    /// everything else is text.
    pub fn parse_loose(raw: &str) -> FlagValue {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return FlagValue::Bool(true),
            "false" => return FlagValue::Bool(false),
            _ => {}
        }
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            if let Ok(value) = i64::from_str_radix(hex, 16) {
                return FlagValue::Int(value);
            }
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return FlagValue::Int(value);
        }
        FlagValue::Text(trimmed.to_string())
    }

    /// Reinterpret a loosely parsed value for a declared domain.
    ///
    /// `0`/`1` read as booleans for boolean flags, and numbers or booleans
    /// read as their text for string flags. Anything else is returned as is
    /// and left for the domain check to judge.
    pub fn coerce_to(&self, domain: ValueDomain) -> FlagValue {
        match (self, domain) {
            (FlagValue::Int(0), ValueDomain::Boolean) => FlagValue::Bool(false),
            (FlagValue::Int(1), ValueDomain::Boolean) => FlagValue::Bool(true),
            (FlagValue::Int(value), ValueDomain::StringLiteral) => FlagValue::Text(value.to_string()),
            (FlagValue::Bool(value), ValueDomain::StringLiteral) => FlagValue::Text(value.to_string()),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(value) => write!(f, "{value}"),
            FlagValue::Int(value) => write!(f, "{value}"),
            FlagValue::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<i32> for FlagValue {
    fn from(value: i32) -> Self {
        FlagValue::Int(i64::from(value))
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Text(value.to_string())
    }
}

/// Grouping tag that decides which emitted section a flag lands in.
///
/// Known variants keep serialization consistent; `Other` lets registries
/// introduce new sections without code changes.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FlagGroup {
    Architecture,
    ConfigurableDefines,
    AvailableHeaders,
    PlatformQuirks,
    Other(String),
}

impl Serialize for FlagGroup {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FlagGroup {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_str(&value))
    }
}

impl FlagGroup {
    pub fn as_str(&self) -> &str {
        match self {
            FlagGroup::Architecture => "architecture",
            FlagGroup::ConfigurableDefines => "configurable_defines",
            FlagGroup::AvailableHeaders => "available_headers",
            FlagGroup::PlatformQuirks => "platform_quirks",
            FlagGroup::Other(value) => value.as_str(),
        }
    }

    fn from_str(value: &str) -> Self {
        match value {
            "architecture" => FlagGroup::Architecture,
            "configurable_defines" => FlagGroup::ConfigurableDefines,
            "available_headers" => FlagGroup::AvailableHeaders,
            "platform_quirks" => FlagGroup::PlatformQuirks,
            other => FlagGroup::Other(other.to_string()),
        }
    }
}

/// How the emitter spells a value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rendering {
    #[default]
    Decimal,
    /// Integers as `0x…`.
    Hex,
    /// `#define NAME` with no literal when the value is boolean true.
    Bare,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_round_trips_known_and_unknown() {
        let known = FlagGroup::AvailableHeaders;
        let json = serde_json::to_string(&known).unwrap();
        assert_eq!(json, "\"available_headers\"");
        let back: FlagGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, known);

        let parsed: FlagGroup = serde_json::from_str("\"vendor_extensions\"").unwrap();
        assert_eq!(parsed, FlagGroup::Other("vendor_extensions".to_string()));
        assert_eq!(
            serde_json::to_string(&parsed).unwrap(),
            "\"vendor_extensions\""
        );
    }

    #[test]
    fn flag_values_deserialize_untagged() {
        let values: Vec<FlagValue> = serde_json::from_str(r#"[true, 4096, ".libs/"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                FlagValue::Bool(true),
                FlagValue::Int(4096),
                FlagValue::Text(".libs/".into())
            ]
        );
        let removal: Option<FlagValue> = serde_json::from_str("null").unwrap();
        assert_eq!(removal, None);
    }

    #[test]
    fn loose_values_coerce_into_declared_domains() {
        assert_eq!(FlagValue::Int(1).coerce_to(ValueDomain::Boolean), FlagValue::Bool(true));
        assert_eq!(FlagValue::Int(0).coerce_to(ValueDomain::Boolean), FlagValue::Bool(false));
        assert_eq!(FlagValue::Int(2).coerce_to(ValueDomain::Boolean), FlagValue::Int(2));
        assert_eq!(
            FlagValue::Int(7).coerce_to(ValueDomain::StringLiteral),
            FlagValue::Text("7".into())
        );
        assert_eq!(
            FlagValue::Bool(true).coerce_to(ValueDomain::StringLiteral),
            FlagValue::Text("true".into())
        );
        assert_eq!(FlagValue::Int(1).coerce_to(ValueDomain::Integer), FlagValue::Int(1));
        assert_eq!(
            FlagValue::Text("yes".into()).coerce_to(ValueDomain::Boolean),
            FlagValue::Text("yes".into())
        );
    }

    #[test]
    fn domain_membership() {
        assert!(FlagValue::Bool(false).satisfies(ValueDomain::Boolean));
        assert!(!FlagValue::Int(1).satisfies(ValueDomain::Boolean));
        assert!(FlagValue::Int(0x1000).satisfies(ValueDomain::Integer));
        assert!(FlagValue::from("S_IWUSR").satisfies(ValueDomain::Symbol));
        assert!(!FlagValue::from(".libs/").satisfies(ValueDomain::Symbol));
        assert!(FlagValue::from(".libs/").satisfies(ValueDomain::StringLiteral));
    }

    #[test]
    fn loose_parsing_prefers_typed_values() {
        assert_eq!(FlagValue::parse_loose("true"), FlagValue::Bool(true));
        assert_eq!(FlagValue::parse_loose("0x2000"), FlagValue::Int(0x2000));
        assert_eq!(FlagValue::parse_loose(" 16384 "), FlagValue::Int(16384));
        assert_eq!(FlagValue::parse_loose("-1"), FlagValue::Int(-1));
        assert_eq!(
            FlagValue::parse_loose("S_IWUSR"),
            FlagValue::Text("S_IWUSR".into())
        );
    }

    #[test]
    fn flag_names_must_be_identifiers() {
        assert!(FlagName::from("_POSIX_PATH_MAX").is_valid());
        assert!(FlagName::from("HAVE_SYS_TYPES_H").is_valid());
        assert!(!FlagName::from("9LIVES").is_valid());
        assert!(!FlagName::from("HAVE-MMAP").is_valid());
        assert!(!FlagName::from("").is_valid());
    }
}
