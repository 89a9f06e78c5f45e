use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Largest number of fractional digits an exact decimal can carry.
pub const MAX_DECIMAL_SCALE: u32 = 28;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown cast '{0}' (expected int, integer, float, double or decimal(P,S))")]
    UnknownCast(String),
    #[error("Invalid decimal cast '{spec}': {reason}")]
    InvalidDecimal { spec: String, reason: String },
    #[error("Target field name must not be empty")]
    EmptyTargetName,
    #[error("Field '{0}' has an empty candidate name")]
    EmptyCandidate(String),
    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),
    #[error("Failed to parse JSON mapping: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse TOML mapping: {0}")]
    Toml(#[from] toml::de::Error),
}

/// What happens when a value cannot be coerced to its cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastMode {
    /// Keep the original, uncast value.
    #[default]
    Lenient,
    /// Report the failure as an error.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastSpec {
    Integer,
    Float,
    /// `precision` is informational; `scale` is the number of fractional digits kept.
    Decimal { precision: u32, scale: u32 },
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^decimal\(\s*(\d+)\s*,\s*(\d+)\s*\)$").expect("decimal cast pattern is valid")
    })
}

impl FromStr for CastSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "int" | "integer" => Ok(CastSpec::Integer),
            "float" | "double" => Ok(CastSpec::Float),
            other => {
                let caps = decimal_pattern()
                    .captures(other)
                    .ok_or_else(|| ConfigError::UnknownCast(s.to_string()))?;
                let invalid = |reason: &str| ConfigError::InvalidDecimal {
                    spec: s.to_string(),
                    reason: reason.to_string(),
                };
                let precision: u32 = caps[1]
                    .parse()
                    .map_err(|_| invalid("precision out of range"))?;
                let scale: u32 = caps[2].parse().map_err(|_| invalid("scale out of range"))?;
                if precision == 0 {
                    return Err(invalid("precision must be positive"));
                }
                if scale > precision {
                    return Err(invalid("scale exceeds precision"));
                }
                if scale > MAX_DECIMAL_SCALE {
                    return Err(invalid("scale exceeds 28 fractional digits"));
                }
                Ok(CastSpec::Decimal { precision, scale })
            }
        }
    }
}

impl fmt::Display for CastSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastSpec::Integer => write!(f, "integer"),
            CastSpec::Float => write!(f, "float"),
            CastSpec::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
        }
    }
}

/// How one target field is produced from a source row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    candidates: Vec<String>,
    cast: Option<CastSpec>,
    default: Option<Value>,
    mode: Option<CastMode>,
}

impl FieldRule {
    /// `candidates` are tried left to right.
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldRule {
            candidates: candidates.into_iter().map(Into::into).collect(),
            cast: None,
            default: None,
            mode: None,
        }
    }

    pub fn with_cast(mut self, cast: CastSpec) -> Self {
        self.cast = Some(cast);
        self
    }

    /// A null default is the same as no default.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = (!default.is_null()).then_some(default);
        self
    }

    pub fn with_mode(mut self, mode: CastMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn cast(&self) -> Option<CastSpec> {
        self.cast
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The field's own mode, falling back to the mapping-wide one.
    pub fn effective_mode(&self, rules: &Rules) -> CastMode {
        self.mode.unwrap_or(rules.cast_mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub trim_strings: bool,
    pub drop_null_target_fields: bool,
    pub cast_mode: CastMode,
}

/// A validated, immutable mapping between a source shape and a target shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawMappingConfig")]
pub struct MappingConfig {
    source_kind: String,
    target_kind: String,
    fields: Vec<(String, FieldRule)>,
    rules: Rules,
}

impl MappingConfig {
    pub fn new(fields: Vec<(String, FieldRule)>, rules: Rules) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for (name, rule) in &fields {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyTargetName);
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateField(name.clone()));
            }
            if rule.candidates.iter().any(|c| c.trim().is_empty()) {
                return Err(ConfigError::EmptyCandidate(name.clone()));
            }
        }
        Ok(MappingConfig {
            source_kind: String::new(),
            target_kind: String::new(),
            fields,
            rules,
        })
    }

    pub fn with_kinds(mut self, source_kind: &str, target_kind: &str) -> Self {
        self.source_kind = source_kind.to_string();
        self.target_kind = target_kind.to_string();
        self
    }

    /// Replaces the mapping-wide cast mode. Per-field modes still win.
    pub fn with_cast_mode(mut self, mode: CastMode) -> Self {
        self.rules.cast_mode = mode;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawMappingConfig = serde_json::from_str(json)?;
        raw.try_into()
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let raw: RawMappingConfig = serde_json::from_value(value)?;
        raw.try_into()
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let raw: RawMappingConfig = toml::from_str(toml_content)?;
        raw.try_into()
    }

    pub fn source_kind(&self) -> &str {
        &self.source_kind
    }

    pub fn target_kind(&self) -> &str {
        &self.target_kind
    }

    /// Target fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, rule)| rule)
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ── Wire shape ────────────────────────────────────────────────────────────────

/// Mapping configuration as written in a JSON or TOML file. Unknown keys are
/// ignored; validation happens when converting into [`MappingConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMappingConfig {
    #[serde(default)]
    pub source_kind: String,
    #[serde(default)]
    pub target_kind: String,
    #[serde(default)]
    pub fields: OrderedFields,
    #[serde(default)]
    pub rules: Rules,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFieldRule {
    #[serde(default)]
    pub candidates: Vec<String>,
    pub cast: Option<String>,
    pub default: Option<Value>,
    pub mode: Option<CastMode>,
}

/// Field table that keeps entries in document order, duplicates included.
#[derive(Debug, Clone, Default)]
pub struct OrderedFields(pub Vec<(String, RawFieldRule)>);

impl<'de> Deserialize<'de> for OrderedFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = OrderedFields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of target field name to field rule")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, rule)) = map.next_entry::<String, RawFieldRule>()? {
                    entries.push((name, rule));
                }
                Ok(OrderedFields(entries))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

impl TryFrom<RawMappingConfig> for MappingConfig {
    type Error = ConfigError;

    fn try_from(raw: RawMappingConfig) -> Result<Self, Self::Error> {
        let fields = raw
            .fields
            .0
            .into_iter()
            .map(|(name, spec)| -> Result<(String, FieldRule), ConfigError> {
                let mut rule = FieldRule::new(spec.candidates);
                if let Some(cast) = spec.cast {
                    rule = rule.with_cast(cast.parse()?);
                }
                if let Some(default) = spec.default {
                    rule = rule.with_default(default);
                }
                if let Some(mode) = spec.mode {
                    rule = rule.with_mode(mode);
                }
                Ok((name, rule))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MappingConfig::new(fields, raw.rules)?.with_kinds(&raw.source_kind, &raw.target_kind))
    }
}
