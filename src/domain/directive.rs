//! Field masking directives and field type tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy names that are not provider names
const INFER: &str = "infer";
const SKIP_NAMES: [&str; 3] = ["none", "null", ""];

/// How a field's values are obscured
///
/// Parsed from the strategy string of an `[include]` entry: `"infer"`
/// requests provider inference, `"none"` emits the field verbatim, and any
/// other string names a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MaskStrategy {
    /// Substitute values with a registered provider
    Provider(String),
    /// Derive the provider from the field's declared type
    Infer,
    /// Emit values unchanged
    Skip,
}

impl MaskStrategy {
    /// Parses a strategy directive
    ///
    /// # Examples
    ///
    /// ```
    /// use anonymize_it::domain::directive::MaskStrategy;
    ///
    /// assert_eq!(MaskStrategy::parse("infer"), MaskStrategy::Infer);
    /// assert_eq!(MaskStrategy::parse("none"), MaskStrategy::Skip);
    /// assert_eq!(MaskStrategy::parse("ipv4"), MaskStrategy::Provider("ipv4".to_string()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        if normalized == INFER {
            Self::Infer
        } else if SKIP_NAMES.contains(&normalized.as_str()) {
            Self::Skip
        } else {
            Self::Provider(normalized)
        }
    }

    /// Whether values of this field are substituted
    pub fn is_masking(&self) -> bool {
        !matches!(self, Self::Skip)
    }

    /// The provider name, if one is set
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Provider(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for MaskStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(name) => write!(f, "{name}"),
            Self::Infer => write!(f, "{INFER}"),
            Self::Skip => write!(f, "none"),
        }
    }
}

impl From<String> for MaskStrategy {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<MaskStrategy> for String {
    fn from(strategy: MaskStrategy) -> Self {
        strategy.to_string()
    }
}

/// A field path paired with its masking strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDirective {
    /// Dot-delimited flattened field path
    pub field: String,
    /// Strategy applied to the field's values
    pub strategy: MaskStrategy,
}

impl FieldDirective {
    /// Creates a directive
    ///
    /// # Errors
    ///
    /// Returns an error message if the field path is empty.
    pub fn new(field: impl Into<String>, strategy: MaskStrategy) -> Result<Self, String> {
        let field = field.into();
        if field.trim().is_empty() {
            return Err("Field path in masking directive cannot be empty".to_string());
        }
        Ok(Self { field, strategy })
    }
}

/// Declared data type of a field, as reported by a source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Keyword,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Ip,
    Unknown(String),
}

impl FieldType {
    /// Maps an Elasticsearch mapping type onto a type tag
    pub fn from_es_type(es_type: &str) -> Self {
        match es_type {
            "keyword" | "constant_keyword" | "wildcard" => Self::Keyword,
            "text" | "match_only_text" => Self::Text,
            "long" | "integer" | "short" | "byte" | "unsigned_long" => Self::Integer,
            "double" | "float" | "half_float" | "scaled_float" => Self::Float,
            "boolean" => Self::Boolean,
            "date" | "date_nanos" => Self::Date,
            "ip" => Self::Ip,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Type tag of a JSON scalar, `None` for nulls
    pub fn of_value(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self::Integer),
            Value::Number(_) => Some(Self::Float),
            Value::String(_) => Some(Self::Keyword),
            Value::Array(items) => items.iter().find_map(Self::of_value),
            Value::Object(_) => Some(Self::Unknown("object".to_string())),
        }
    }

    /// Strategy chosen for this type by provider inference
    ///
    /// Unknown types map to [`MaskStrategy::Skip`]; callers log a warning.
    pub fn inferred_strategy(&self) -> MaskStrategy {
        let provider = match self {
            Self::Ip => "ipv4",
            Self::Keyword => "token",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Date => "date",
            Self::Text | Self::Boolean | Self::Unknown(_) => return MaskStrategy::Skip,
        };
        MaskStrategy::Provider(provider.to_string())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
            Self::Ip => write!(f, "ip"),
            Self::Unknown(tag) => write!(f, "{tag}"),
        }
    }
}
