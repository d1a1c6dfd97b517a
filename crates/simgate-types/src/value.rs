//! Raw simulator results.
//!
//! Simulators return a [`Value`]: a closed sum type covering every shape a
//! numeric simulation produces (scalars, complex numbers, N-dimensional
//! arrays, timestamps, transfer functions, records). The serializer in
//! `simgate-core` turns a [`Value`] into a JSON-safe tree in a single
//! structural match, so no per-level type probing is needed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A complex number with `f64` components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Complex {
    /// Real part.
    pub re: f64,
    /// Imaginary part.
    pub im: f64,
}

impl Complex {
    /// Construct from real and imaginary parts.
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Magnitude `|z|`.
    pub fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }

    /// Phase angle in radians.
    pub fn arg(self) -> f64 {
        self.im.atan2(self.re)
    }
}

/// A dense N-dimensional real array in row-major order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NdArray {
    /// Extent of each dimension. Empty for a 0-d (scalar) array.
    pub shape: Vec<usize>,
    /// Elements in row-major order.
    pub data: Vec<f64>,
}

impl NdArray {
    /// Construct from an explicit shape and row-major data.
    ///
    /// The shape is not checked against the data length here; a mismatch
    /// degrades to a flat list when serialized.
    pub const fn new(shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self { shape, data }
    }

    /// A one-dimensional array.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// A two-dimensional array from equally sized rows.
    ///
    /// Ragged input keeps the first row's width as the column count, so
    /// the mismatch is visible as a flat list downstream.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let shape = vec![rows.len(), cols];
        let data = rows.into_iter().flatten().collect();
        Self { shape, data }
    }

    /// Total element count implied by the shape.
    pub fn shape_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1_usize, |acc, d| acc.checked_mul(*d))
    }
}

/// A dense N-dimensional complex array in row-major order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexArray {
    /// Extent of each dimension.
    pub shape: Vec<usize>,
    /// Elements in row-major order.
    pub data: Vec<Complex>,
}

impl ComplexArray {
    /// Construct from an explicit shape and row-major data.
    pub const fn new(shape: Vec<usize>, data: Vec<Complex>) -> Self {
        Self { shape, data }
    }

    /// A one-dimensional complex array.
    pub fn from_vec(data: Vec<Complex>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }
}

/// A value with no structural representation, rendered by its
/// [`Display`](fmt::Display) form.
#[derive(Clone)]
pub struct Opaque(Arc<dyn fmt::Display + Send + Sync>);

impl Opaque {
    /// Wrap any displayable value.
    pub fn new(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Self(Arc::new(value))
    }
}

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.0.to_string()).finish()
    }
}

/// A raw simulator result.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer too large for `i64`.
    UInt(u64),
    /// A real number.
    Float(f64),
    /// A complex scalar.
    Complex(Complex),
    /// A string.
    Text(String),
    /// A UTC timestamp.
    DateTime(DateTime<Utc>),
    /// A calendar date.
    Date(NaiveDate),
    /// An N-dimensional real array.
    Array(NdArray),
    /// An N-dimensional complex array.
    ComplexArray(ComplexArray),
    /// A heterogeneous sequence.
    List(Vec<Value>),
    /// A mapping; keys are coerced to strings on serialization.
    Map(Vec<(Value, Value)>),
    /// A transfer function given by numerator and denominator
    /// coefficients.
    TransferFunction {
        /// Numerator coefficients.
        num: Box<Value>,
        /// Denominator coefficients.
        den: Box<Value>,
    },
    /// An object exposed through its named fields.
    Record(Vec<(String, Value)>),
    /// Anything else, rendered by its string form.
    Opaque(Opaque),
}

impl Value {
    /// Build a string-keyed map from `(key, value)` pairs, preserving
    /// their order.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Self::Text(k.into()), v))
                .collect(),
        )
    }

    /// Wrap any displayable value as [`Value::Opaque`].
    pub fn opaque(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Self::Opaque(Opaque::new(value))
    }

    /// A transfer function from coefficient slices.
    pub fn transfer_function(num: &[f64], den: &[f64]) -> Self {
        Self::TransferFunction {
            num: Box::new(Self::Array(NdArray::from_vec(num.to_vec()))),
            den: Box::new(Self::Array(NdArray::from_vec(den.to_vec()))),
        }
    }

    /// Look up a string key in a [`Value::Map`] or [`Value::Record`].
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.iter().find_map(|(k, v)| match k {
                Self::Text(s) if s == key => Some(v),
                _ => None,
            }),
            Self::Record(fields) => fields
                .iter()
                .find_map(|(k, v)| (k == key).then_some(v)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::UInt(v), Self::Int)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        u64::try_from(v).map_or(Self::UInt(u64::MAX), Self::from)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Complex> for Value {
    fn from(v: Complex) -> Self {
        Self::Complex(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Self {
        Self::Array(v)
    }
}

impl From<ComplexArray> for Value {
    fn from(v: ComplexArray) -> Self {
        Self::ComplexArray(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(NdArray::from_vec(v))
    }
}

impl From<Vec<Complex>> for Value {
    fn from(v: Vec<Complex>) -> Self {
        Self::ComplexArray(ComplexArray::from_vec(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    n.as_f64().map_or(Self::Null, Self::Float)
                }
            }
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (Self::Text(k), Self::from(v)))
                    .collect(),
            ),
        }
    }
}
