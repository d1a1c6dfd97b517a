//! Conversion of raw simulator results into JSON-safe trees.
//!
//! [`serialize`] walks a [`Value`] once and never fails: every variant has
//! a JSON rendering, and anything without structure falls back to its
//! string form. The output contains only JSON primitives, lists, and
//! string-keyed objects.

use serde_json::{Map, Value as Json};
use simgate_types::{Complex, ComplexArray, NdArray, Value};

/// Convert a raw simulator result into a JSON-safe tree.
///
/// - Complex scalars become `{real, imag}`.
/// - Real N-d arrays become nested lists following their shape.
/// - Complex arrays become a flat list of `{real, imag}`; a single-element
///   array collapses to one object.
/// - Map keys are coerced to strings.
/// - Timestamps and dates become ISO-8601 strings.
/// - Transfer functions become `{num, den}`.
/// - Non-finite floats become `"NaN"`, `"inf"`, or `"-inf"`.
pub fn serialize(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(f) => float(*f),
        Value::Complex(c) => complex(*c),
        Value::Text(s) => Json::String(s.clone()),
        Value::DateTime(dt) => Json::String(dt.to_rfc3339()),
        Value::Date(d) => Json::String(d.to_string()),
        Value::Array(arr) => real_array(arr),
        Value::ComplexArray(arr) => complex_array(arr),
        Value::List(items) => Json::Array(items.iter().map(serialize).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (key_string(k), serialize(v)))
                .collect(),
        ),
        Value::TransferFunction { num, den } => {
            let mut obj = Map::new();
            obj.insert(String::from("num"), serialize(num));
            obj.insert(String::from("den"), serialize(den));
            Json::Object(obj)
        }
        Value::Record(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), serialize(v)))
                .collect(),
        ),
        Value::Opaque(o) => Json::String(o.to_string()),
    }
}

/// A float as a JSON number, or its string form when not finite.
pub fn float(v: f64) -> Json {
    serde_json::Number::from_f64(v).map_or_else(|| Json::String(v.to_string()), Json::Number)
}

/// A complex number as `{real, imag}`.
pub fn complex(c: Complex) -> Json {
    let mut obj = Map::new();
    obj.insert(String::from("real"), float(c.re));
    obj.insert(String::from("imag"), float(c.im));
    Json::Object(obj)
}

fn real_array(arr: &NdArray) -> Json {
    if arr.shape.is_empty() {
        // 0-d array: a scalar.
        return match arr.data.as_slice() {
            [only] => float(*only),
            data => flat(data),
        };
    }
    if arr.shape_len() != Some(arr.data.len()) {
        return flat(&arr.data);
    }
    nest(&arr.data, &arr.shape)
}

fn flat(data: &[f64]) -> Json {
    Json::Array(data.iter().copied().map(float).collect())
}

/// Nest row-major `data` into lists following `shape`.
///
/// The caller guarantees `data.len()` equals the product of `shape`.
fn nest(data: &[f64], shape: &[usize]) -> Json {
    let Some((&outer, rest)) = shape.split_first() else {
        return data.first().map_or(Json::Null, |v| float(*v));
    };
    if rest.is_empty() {
        return flat(data);
    }
    let inner: usize = rest.iter().product();
    if inner == 0 {
        return Json::Array((0..outer).map(|_| nest(&[], rest)).collect());
    }
    Json::Array(data.chunks(inner).map(|chunk| nest(chunk, rest)).collect())
}

fn complex_array(arr: &ComplexArray) -> Json {
    match arr.data.as_slice() {
        [only] => complex(*only),
        data => Json::Array(data.iter().copied().map(complex).collect()),
    }
}

/// String form of a map key.
fn key_string(key: &Value) -> String {
    match key {
        Value::Text(s) => s.clone(),
        Value::Null => String::from("null"),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Opaque(o) => o.to_string(),
        other => serialize(other).to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn primitives_pass_through() {
        assert_eq!(serialize(&Value::Null), Json::Null);
        assert_eq!(serialize(&Value::from(true)), json!(true));
        assert_eq!(serialize(&Value::from(42_i64)), json!(42));
        assert_eq!(serialize(&Value::from(2.5)), json!(2.5));
        assert_eq!(serialize(&Value::from("rc")), json!("rc"));
    }

    #[test]
    fn serialized_json_is_a_fixed_point() {
        let original = json!({"a": [1, 2.5, "x", null, {"b": false}], "c": {}});
        let round = serialize(&Value::from(original.clone()));
        assert_eq!(round, original);
    }

    #[test]
    fn matrix_nests_by_shape() {
        let arr = NdArray::from_rows(vec![vec![1.0, 2.0, 3.0, 4.0]; 3]);
        let out = serialize(&Value::from(arr));
        let rows = out.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(row, &json!([1.0, 2.0, 3.0, 4.0]));
        }
    }

    #[test]
    fn three_dimensional_array_nests() {
        let arr = NdArray::new(vec![2, 1, 2], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            serialize(&Value::from(arr)),
            json!([[[1.0, 2.0]], [[3.0, 4.0]]])
        );
    }

    #[test]
    fn shape_mismatch_degrades_to_flat_list() {
        let arr = NdArray::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
        assert_eq!(serialize(&Value::from(arr)), json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn zero_dimensional_array_is_scalar() {
        let arr = NdArray::new(vec![], vec![7.5]);
        assert_eq!(serialize(&Value::from(arr)), json!(7.5));
    }

    #[test]
    fn complex_scalar_becomes_object() {
        let out = serialize(&Value::from(Complex::new(3.0, 4.0)));
        assert_eq!(out, json!({"real": 3.0, "imag": 4.0}));
    }

    #[test]
    fn complex_arrays_flatten_and_collapse() {
        let many = ComplexArray::new(
            vec![2, 1],
            vec![Complex::new(1.0, 0.0), Complex::new(0.0, -1.0)],
        );
        assert_eq!(
            serialize(&Value::from(many)),
            json!([{"real": 1.0, "imag": 0.0}, {"real": 0.0, "imag": -1.0}])
        );

        let one = ComplexArray::from_vec(vec![Complex::new(0.5, 0.5)]);
        assert_eq!(
            serialize(&Value::from(one)),
            json!({"real": 0.5, "imag": 0.5})
        );
    }

    #[test]
    fn non_finite_floats_become_strings() {
        assert_eq!(serialize(&Value::from(f64::NAN)), json!("NaN"));
        assert_eq!(serialize(&Value::from(f64::INFINITY)), json!("inf"));
        assert_eq!(serialize(&Value::from(f64::NEG_INFINITY)), json!("-inf"));
    }

    #[test]
    fn map_keys_are_coerced_to_strings() {
        let map = Value::Map(vec![
            (Value::from(1_i64), Value::from("one")),
            (Value::from(true), Value::Null),
        ]);
        assert_eq!(serialize(&map), json!({"1": "one", "true": null}));
    }

    #[test]
    fn timestamps_are_iso8601() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            serialize(&Value::from(dt)),
            json!("2024-03-01T12:00:00+00:00")
        );
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(serialize(&Value::from(d)), json!("2024-03-01"));
    }

    #[test]
    fn transfer_function_has_num_and_den() {
        let tf = Value::transfer_function(&[1.0], &[1.0, 0.001]);
        assert_eq!(serialize(&tf), json!({"num": [1.0], "den": [1.0, 0.001]}));
    }

    #[test]
    fn records_and_opaque_values() {
        let rec = Value::Record(vec![(String::from("gain"), Value::from(2.0))]);
        assert_eq!(serialize(&rec), json!({"gain": 2.0}));
        assert_eq!(serialize(&Value::opaque("sensor#3")), json!("sensor#3"));
    }
}
