use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DataSourceError;

/// Backing engine a data source is bound to
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Local file decoded into an in-memory dataset
    Native,
    /// Druid cluster reached over HTTP
    Druid,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Native => write!(f, "native"),
            EngineKind::Druid => write!(f, "druid"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = DataSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(EngineKind::Native),
            "druid" => Ok(EngineKind::Druid),
            other => Err(DataSourceError::configuration(format!(
                "invalid engine '{}', must be one of native, druid",
                other
            ))),
        }
    }
}

/// How a data source should be introspected.
///
/// Ordered from most to least automatic; a successful introspection only ever
/// moves a source towards `NoAutofill`, never back.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntrospectionPolicy {
    /// Take what is written in the config as the rule of law
    None,
    /// Introspect but do not generate dimensions or measures
    NoAutofill,
    AutofillDimensionsOnly,
    AutofillMeasuresOnly,
    /// Introspect and generate dimensions and measures
    AutofillAll,
}

impl IntrospectionPolicy {
    pub const VALUES: [&'static str; 5] = [
        "none",
        "no-autofill",
        "autofill-dimensions-only",
        "autofill-measures-only",
        "autofill-all",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntrospectionPolicy::None => "none",
            IntrospectionPolicy::NoAutofill => "no-autofill",
            IntrospectionPolicy::AutofillDimensionsOnly => "autofill-dimensions-only",
            IntrospectionPolicy::AutofillMeasuresOnly => "autofill-measures-only",
            IntrospectionPolicy::AutofillAll => "autofill-all",
        }
    }

    pub fn is_autofill(&self) -> bool {
        matches!(
            self,
            IntrospectionPolicy::AutofillDimensionsOnly
                | IntrospectionPolicy::AutofillMeasuresOnly
                | IntrospectionPolicy::AutofillAll
        )
    }

    /// Policy after a successful schema discovery
    pub fn narrowed(self) -> Self {
        if self.is_autofill() {
            IntrospectionPolicy::NoAutofill
        } else {
            self
        }
    }
}

impl Default for IntrospectionPolicy {
    fn default() -> Self {
        IntrospectionPolicy::AutofillAll
    }
}

impl fmt::Display for IntrospectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntrospectionPolicy {
    type Err = DataSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(IntrospectionPolicy::None),
            "no-autofill" => Ok(IntrospectionPolicy::NoAutofill),
            "autofill-dimensions-only" => Ok(IntrospectionPolicy::AutofillDimensionsOnly),
            "autofill-measures-only" => Ok(IntrospectionPolicy::AutofillMeasuresOnly),
            "autofill-all" => Ok(IntrospectionPolicy::AutofillAll),
            other => Err(DataSourceError::configuration(format!(
                "invalid introspection value {}, must be one of {}",
                other,
                Self::VALUES.join(", ")
            ))),
        }
    }
}

/// Attribute data types discovered by introspection
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Boolean,
    Int64,
    Float64,
    String,
    /// ISO 8601 timestamp
    Timestamp,
    /// Nested or engine-specific complex value
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Null => write!(f, "null"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Float64 => write!(f, "float64"),
            FieldType::String => write!(f, "string"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Json => write!(f, "json"),
        }
    }
}

/// Column/attribute metadata of a data source
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A row of data as key-value pairs
pub type DataRow = HashMap<String, serde_json::Value>;
