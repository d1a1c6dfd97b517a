//! Caller-supplied simulation parameters.
//!
//! A [`ParameterSet`] is the configuration a client sends for one
//! simulation invocation. Values are restricted to scalars (bool, integer,
//! float, string); anything nested is rejected at the boundary with a
//! [`ParamError`] so the rest of the pipeline never sees it.
//!
//! The set is backed by a [`BTreeMap`], so its canonical form -- the
//! sorted-key JSON used to derive cache keys -- is independent of the
//! order in which the client wrote the keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Errors raised while accepting or validating parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// The `params` payload was not a JSON object.
    #[error("parameters must be a JSON object")]
    NotAnObject,
    /// A parameter value was an array, object, or null.
    #[error("parameter '{name}' must be a scalar, found {found}")]
    UnsupportedType {
        /// Parameter name.
        name: String,
        /// JSON type that was found.
        found: &'static str,
    },
    /// A numeric parameter was NaN or infinite.
    #[error("parameter '{name}' must be finite")]
    NonFinite {
        /// Parameter name.
        name: String,
    },
    /// A numeric parameter could not be read as a number.
    #[error("parameter '{name}' must be a number")]
    NotANumber {
        /// Parameter name.
        name: String,
    },
    /// A required parameter was absent and has no default.
    #[error("missing required parameter: {name}")]
    Missing {
        /// Parameter name.
        name: String,
    },
}

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean flag (checkbox).
    Bool(bool),
    /// An integral number.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string (select option, waveform name, ...).
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value, if it is a number.
    ///
    /// Numeric strings are accepted, matching how slider values arrive
    /// from form-encoded clients.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Bool(_) => None,
        }
    }

    /// Truthiness of the value.
    ///
    /// Non-zero numbers and non-empty strings other than `"false"`/`"0"`
    /// are true.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Text(s) => !(s.is_empty() || s == "false" || s == "0"),
        }
    }

    /// String view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert a JSON value, rejecting nested and non-finite values.
    pub fn from_json(name: &str, value: &serde_json::Value) -> Result<Self, ParamError> {
        match value {
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => Ok(Self::Float(f)),
                        _ => Err(ParamError::NonFinite {
                            name: name.to_owned(),
                        }),
                    }
                }
            }
            serde_json::Value::String(s) => Ok(Self::Text(s.clone())),
            serde_json::Value::Null => Err(ParamError::UnsupportedType {
                name: name.to_owned(),
                found: "null",
            }),
            serde_json::Value::Array(_) => Err(ParamError::UnsupportedType {
                name: name.to_owned(),
                found: "array",
            }),
            serde_json::Value::Object(_) => Err(ParamError::UnsupportedType {
                name: name.to_owned(),
                found: "object",
            }),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// An immutable-once-received mapping of parameter names to scalar values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    /// Create an empty parameter set.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert, returning the extended set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Accept a JSON object from a client request.
    pub fn from_json_map(
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ParamError> {
        let mut out = BTreeMap::new();
        for (name, value) in map {
            out.insert(name.clone(), ParamValue::from_json(name, value)?);
        }
        Ok(Self(out))
    }

    /// Accept any JSON value, which must be an object (or null for "none").
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ParamError> {
        match value {
            serde_json::Value::Object(map) => Self::from_json_map(map),
            serde_json::Value::Null => Ok(Self::new()),
            _ => Err(ParamError::NotAnObject),
        }
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Numeric parameter lookup.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(ParamValue::as_f64)
    }

    /// Whether the set contains a parameter.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in sorted-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sorted-key JSON form used for hashing.
    pub fn canonical(&self) -> String {
        // A map of strings to scalars always serializes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// JSON object view of the set.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
