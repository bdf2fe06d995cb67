//! Typed scalar values carried by node values and attributes

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value that can be stored as a node value or an attribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn string(s: impl Into<String>) -> Self {
        Scalar::Str(s.into())
    }

    pub fn int(n: i64) -> Self {
        Scalar::Int(n)
    }

    pub fn bool(b: bool) -> Self {
        Scalar::Bool(b)
    }

    /// Retype a raw string the way a replicated store hands it back.
    ///
    /// `"true"`/`"false"` become booleans, integer literals become `Int`,
    /// finite float literals become `Float`, everything else stays a string.
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => return Scalar::Bool(true),
            "false" => return Scalar::Bool(false),
            _ => {}
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() != raw.len() {
            return Scalar::Str(raw.to_string());
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Scalar::Int(n);
        }
        // `parse::<f64>` accepts "inf" and "NaN", which are not numeric-looking
        let looks_numeric = trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
        if looks_numeric {
            if let Ok(f) = trimmed.parse::<f64>() {
                if f.is_finite() {
                    return Scalar::Float(f);
                }
            }
        }
        Scalar::Str(raw.to_string())
    }

    /// Apply [`Scalar::infer`] to strings; typed values are returned as-is.
    pub fn retyped(&self) -> Self {
        match self {
            Scalar::Str(s) => Scalar::infer(s),
            other => other.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.retyped() {
            Scalar::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Integer view; integral floats are accepted, anything else is absent.
    pub fn as_int(&self) -> Option<i64> {
        match self.retyped() {
            Scalar::Int(n) => Some(n),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into a JSON value as stored; see [`Scalar::retyped`] for inference
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Int(n) => serde_json::Value::from(*n),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Scalar::Str(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Convert a JSON scalar. Returns `None` for null, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            serde_json::Value::String(s) => Some(Scalar::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}
