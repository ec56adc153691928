use crate::encoding::{EncodingCatalog, EncodingId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Group an option belongs to in the engine's option table.
///
/// Declaration order is the order used when writing config text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionCategory {
    Markup,
    Diagnostics,
    PrettyPrint,
    Encoding,
    Miscellaneous,
}

impl fmt::Display for OptionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionCategory::Markup => "markup",
            OptionCategory::Diagnostics => "diagnostics",
            OptionCategory::PrettyPrint => "pretty-print",
            OptionCategory::Encoding => "encoding",
            OptionCategory::Miscellaneous => "miscellaneous",
        };
        f.write_str(name)
    }
}

/// Value domain of an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionType {
    Boolean,
    Integer { min: i64, max: i64 },
    /// Allowed values in display order.
    Enum(Vec<String>),
    String,
    Encoding,
}

impl OptionType {
    /// Short name used in error messages and descriptions.
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionType::Boolean => "boolean",
            OptionType::Integer { .. } => "integer",
            OptionType::Enum(_) => "enum",
            OptionType::String => "string",
            OptionType::Encoding => "encoding",
        }
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionValue {
    Boolean(bool),
    Integer(i64),
    Enum(String),
    String(String),
    Encoding(EncodingId),
}

impl OptionValue {
    fn kind(&self) -> &'static str {
        match self {
            OptionValue::Boolean(_) => "boolean",
            OptionValue::Integer(_) => "integer",
            OptionValue::Enum(_) => "enum",
            OptionValue::String(_) => "string",
            OptionValue::Encoding(_) => "encoding",
        }
    }
}

/// Renders values in the engine's config syntax (`yes`/`no` for booleans).
impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Boolean(true) => f.write_str("yes"),
            OptionValue::Boolean(false) => f.write_str("no"),
            OptionValue::Integer(i) => write!(f, "{}", i),
            OptionValue::Enum(s) | OptionValue::String(s) => f.write_str(s),
            OptionValue::Encoding(id) => write!(f, "{}", id),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Boolean(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<EncodingId> for OptionValue {
    fn from(value: EncodingId) -> Self {
        OptionValue::Encoding(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

/// Why an option could not be set. Every variant names the rule violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Option {0} is read-only")]
    ReadOnly(String),

    #[error("Option {name} expects a {expected} value, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: String,
    },

    #[error("Option {name} value {value} is outside {min}..={max}")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Option {name} does not accept {value:?}; allowed: {}", .allowed.join(", "))]
    NotInPickList {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Option {0} is not in use")]
    NotInUse(String),
}

impl OptionError {
    /// Name of the option the error concerns.
    pub fn option_name(&self) -> &str {
        match self {
            OptionError::UnknownOption(name)
            | OptionError::ReadOnly(name)
            | OptionError::NotInUse(name)
            | OptionError::TypeMismatch { name, .. }
            | OptionError::OutOfRange { name, .. }
            | OptionError::NotInPickList { name, .. } => name,
        }
    }
}

/// Immutable metadata for one engine option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDescriptor {
    pub name: String,
    pub category: OptionCategory,
    pub value_type: OptionType,
    pub default_value: OptionValue,
    pub read_only: bool,
    pub description: String,
}

impl OptionDescriptor {
    /// Allowed values, present only for enum options.
    pub fn pick_list(&self) -> Option<&[String]> {
        match &self.value_type {
            OptionType::Enum(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_encoding_option(&self) -> bool {
        self.value_type == OptionType::Encoding
    }

    /// Converts `value` into this option's domain.
    ///
    /// Strings are parsed for every type; booleans accept `0`/`1` integers;
    /// enum matching ignores ASCII case and yields the canonical pick-list
    /// entry. Nothing else is converted implicitly. String values must fit
    /// on one config line.
    pub fn coerce(
        &self,
        value: OptionValue,
        catalog: &EncodingCatalog,
    ) -> Result<OptionValue, OptionError> {
        match &self.value_type {
            OptionType::Boolean => self.coerce_boolean(value),
            OptionType::Integer { min, max } => self.coerce_integer(value, *min, *max),
            OptionType::Enum(pick_list) => self.coerce_enum(value, pick_list),
            OptionType::String => match value {
                OptionValue::String(s) | OptionValue::Enum(s) if s.contains(['\n', '\r']) => {
                    Err(OptionError::TypeMismatch {
                        name: self.name.clone(),
                        expected: "single-line string",
                        found: format!("string {:?}", s),
                    })
                }
                OptionValue::String(s) | OptionValue::Enum(s) => Ok(OptionValue::String(s)),
                other => Err(self.mismatch(&other)),
            },
            OptionType::Encoding => self.coerce_encoding(value, catalog),
        }
    }

    fn coerce_boolean(&self, value: OptionValue) -> Result<OptionValue, OptionError> {
        match value {
            OptionValue::Boolean(b) => Ok(OptionValue::Boolean(b)),
            OptionValue::Integer(0) => Ok(OptionValue::Boolean(false)),
            OptionValue::Integer(1) => Ok(OptionValue::Boolean(true)),
            OptionValue::String(ref s) | OptionValue::Enum(ref s) => parse_bool(s)
                .map(OptionValue::Boolean)
                .ok_or_else(|| self.mismatch(&value)),
            other => Err(self.mismatch(&other)),
        }
    }

    fn coerce_integer(
        &self,
        value: OptionValue,
        min: i64,
        max: i64,
    ) -> Result<OptionValue, OptionError> {
        let parsed = match value {
            OptionValue::Integer(i) => i,
            OptionValue::String(ref s) | OptionValue::Enum(ref s) => {
                s.trim().parse::<i64>().map_err(|_| self.mismatch(&value))?
            }
            other => return Err(self.mismatch(&other)),
        };

        if parsed < min || parsed > max {
            return Err(OptionError::OutOfRange {
                name: self.name.clone(),
                value: parsed,
                min,
                max,
            });
        }
        Ok(OptionValue::Integer(parsed))
    }

    fn coerce_enum(
        &self,
        value: OptionValue,
        pick_list: &[String],
    ) -> Result<OptionValue, OptionError> {
        let candidate = match value {
            OptionValue::Enum(s) | OptionValue::String(s) => s,
            OptionValue::Boolean(_) | OptionValue::Integer(_) => value.to_string(),
            other => return Err(self.mismatch(&other)),
        };

        pick_list
            .iter()
            .find(|allowed| allowed.eq_ignore_ascii_case(candidate.trim()))
            .map(|allowed| OptionValue::Enum(allowed.clone()))
            .ok_or_else(|| OptionError::NotInPickList {
                name: self.name.clone(),
                value: candidate,
                allowed: pick_list.to_vec(),
            })
    }

    fn coerce_encoding(
        &self,
        value: OptionValue,
        catalog: &EncodingCatalog,
    ) -> Result<OptionValue, OptionError> {
        let resolved = match &value {
            OptionValue::Encoding(id) => catalog.resolve(*id).map(|e| e.id),
            OptionValue::String(s) | OptionValue::Enum(s) => catalog.resolve_name(s).map(|e| e.id),
            other => return Err(self.mismatch(other)),
        };

        resolved
            .map(OptionValue::Encoding)
            .map_err(|_| OptionError::NotInPickList {
                name: self.name.clone(),
                value: value.to_string(),
                allowed: catalog.config_names(),
            })
    }

    fn mismatch(&self, value: &OptionValue) -> OptionError {
        OptionError::TypeMismatch {
            name: self.name.clone(),
            expected: self.value_type.type_name(),
            found: format!("{} {:?}", value.kind(), value.to_string()),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "t" | "1" | "on" => Some(true),
        "no" | "n" | "false" | "f" | "0" | "off" => Some(false),
        _ => None,
    }
}
