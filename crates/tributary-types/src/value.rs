//! Scalar values flowing through rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

/// Declared type of a column or function output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Integer,
    Double,
    #[default]
    Text,
}

impl ValueType {
    pub const ALL: [ValueType; 4] = [Self::Boolean, Self::Integer, Self::Double, Self::Text];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Double)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let legal: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                EtlError::illegal_value("type", s, &legal)
            })
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime type of the value, `None` for null.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueType::Boolean),
            Self::Int(_) => Some(ValueType::Integer),
            Self::Double(_) => Some(ValueType::Double),
            Self::Text(_) => Some(ValueType::Text),
        }
    }

    /// Numeric view of the value. Text is parsed.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Conversion`] for null, booleans and unparsable text.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Int(i) => Ok(*i as f64),
            Self::Double(d) => Ok(*d),
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| EtlError::conversion(s, ValueType::Double)),
            other => Err(EtlError::conversion(other, ValueType::Double)),
        }
    }

    /// Integer view of the value. Doubles must be integral.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Conversion`] when the value has no exact integer form.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Double(d) if d.fract() == 0.0 && d.is_finite() => Ok(*d as i64),
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| EtlError::conversion(s, ValueType::Integer)),
            other => Err(EtlError::conversion(other, ValueType::Integer)),
        }
    }

    /// Boolean view of the value.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Conversion`] for null and unrecognised text.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(i) => Ok(*i != 0),
            Self::Double(d) => Ok(*d != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(EtlError::conversion(s, ValueType::Boolean)),
            },
            Self::Null => Err(EtlError::conversion("null", ValueType::Boolean)),
        }
    }

    /// Convert to `target`. Null converts to null for every type.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Conversion`] when the value cannot be represented.
    pub fn coerce(&self, target: ValueType) -> Result<Value> {
        if self.is_null() || self.value_type() == Some(target) {
            return Ok(self.clone());
        }
        match target {
            ValueType::Boolean => self.as_bool().map(Value::Bool),
            ValueType::Integer => self.as_i64().map(Value::Int),
            ValueType::Double => self.as_f64().map(Value::Double),
            ValueType::Text => Ok(Value::Text(self.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
