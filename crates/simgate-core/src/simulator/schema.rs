//! Parameter constraints declared by a simulator.
//!
//! A [`ParameterSchema`] lists the parameters a simulator understands,
//! their kind, bounds, and defaults. [`ParameterSchema::validate`] turns a
//! client's raw [`ParameterSet`] into the set the simulator actually runs
//! with: missing entries take their default, numbers are clamped into
//! range, unknown select options fall back to the first option, and
//! checkboxes become booleans. Parameters the schema does not name are
//! dropped.

use serde::Serialize;
use simgate_types::{ParamError, ParamValue, ParameterSet};

/// Kind of a declared parameter and its constraints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    /// A real number, optionally bounded. Rendered as a slider.
    Slider {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
        /// UI step size.
        step: Option<f64>,
    },
    /// One of a fixed set of string options.
    Select {
        /// Valid options; the first is the fallback.
        options: Vec<String>,
    },
    /// A boolean flag.
    Checkbox,
    /// Free text.
    Text,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    /// Parameter name as sent by clients.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Kind and constraints.
    #[serde(flatten)]
    pub kind: ParamKind,
    /// Value used when the client omits the parameter.
    pub default: Option<ParamValue>,
    /// Display unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ParamSpec {
    /// A bounded slider with a default.
    pub fn slider(
        name: impl Into<String>,
        label: impl Into<String>,
        min: f64,
        max: f64,
        default: f64,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: ParamKind::Slider {
                min: Some(min),
                max: Some(max),
                step: None,
            },
            default: Some(ParamValue::Float(default)),
            unit: None,
        }
    }

    /// A select with a default option.
    pub fn select<S: Into<String>>(
        name: impl Into<String>,
        label: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: ParamKind::Select {
                options: options.into_iter().map(Into::into).collect(),
            },
            default: Some(ParamValue::Text(default.into())),
            unit: None,
        }
    }

    /// A checkbox with a default.
    pub fn checkbox(name: impl Into<String>, label: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: ParamKind::Checkbox,
            default: Some(ParamValue::Bool(default)),
            unit: None,
        }
    }

    /// Attach a display unit.
    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the slider step. No effect on other kinds.
    #[must_use]
    pub fn step(mut self, value: f64) -> Self {
        if let ParamKind::Slider { ref mut step, .. } = self.kind {
            *step = Some(value);
        }
        self
    }

    /// Remove the default, making the parameter required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.default = None;
        self
    }

    fn coerce(&self, value: &ParamValue) -> Result<ParamValue, ParamError> {
        match &self.kind {
            ParamKind::Slider { min, max, .. } => {
                let mut v = value.as_f64().ok_or_else(|| ParamError::NotANumber {
                    name: self.name.clone(),
                })?;
                if let Some(lo) = min {
                    v = v.max(*lo);
                }
                if let Some(hi) = max {
                    v = v.min(*hi);
                }
                Ok(ParamValue::Float(v))
            }
            ParamKind::Select { options } => {
                let text = value.to_string();
                if options.contains(&text) {
                    Ok(ParamValue::Text(text))
                } else {
                    Ok(options
                        .first()
                        .map_or(ParamValue::Text(text), |first| ParamValue::Text(first.clone())))
                }
            }
            ParamKind::Checkbox => Ok(ParamValue::Bool(value.truthy())),
            ParamKind::Text => Ok(ParamValue::Text(value.to_string())),
        }
    }
}

/// The full set of parameters a simulator declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterSchema {
    specs: Vec<ParamSpec>,
}

impl ParameterSchema {
    /// An empty schema. Simulators with an empty schema receive client
    /// parameters unfiltered.
    pub const fn new() -> Self {
        Self { specs: Vec::new() }
    }

    /// Builder-style append.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Declared parameters in declaration order.
    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Whether the schema declares nothing.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Default values of every parameter that has one.
    pub fn defaults(&self) -> ParameterSet {
        self.specs
            .iter()
            .filter_map(|spec| {
                let default = spec.default.as_ref()?;
                let value = spec.coerce(default).unwrap_or_else(|_| default.clone());
                Some((spec.name.clone(), value))
            })
            .collect()
    }

    /// Produce the parameter set a simulator runs with.
    ///
    /// # Errors
    ///
    /// [`ParamError::Missing`] when a parameter without a default is
    /// absent, [`ParamError::NotANumber`] when a slider value is not
    /// numeric.
    pub fn validate(&self, supplied: &ParameterSet) -> Result<ParameterSet, ParamError> {
        if self.specs.is_empty() {
            return Ok(supplied.clone());
        }
        let mut out = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let value = match (supplied.get(&spec.name), &spec.default) {
                (Some(v), _) | (None, Some(v)) => spec.coerce(v)?,
                (None, None) => {
                    return Err(ParamError::Missing {
                        name: spec.name.clone(),
                    });
                }
            };
            out.push((spec.name.clone(), value));
        }
        Ok(out.into_iter().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn schema() -> ParameterSchema {
        ParameterSchema::new()
            .param(ParamSpec::slider("freq", "Frequency", 1.0, 300.0, 100.0).unit("Hz"))
            .param(ParamSpec::select("wave", "Waveform", ["square", "sine"], "square"))
            .param(ParamSpec::checkbox("harmonics", "Show harmonics", true))
    }

    #[test]
    fn missing_parameters_take_defaults() {
        let out = schema().validate(&ParameterSet::new()).unwrap();
        assert_eq!(out, schema().defaults());
        assert_eq!(out.get_f64("freq"), Some(100.0));
        assert_eq!(out.get("wave"), Some(&ParamValue::from("square")));
        assert_eq!(out.get("harmonics"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn sliders_are_clamped() {
        let out = schema()
            .validate(&ParameterSet::new().with("freq", 10_000))
            .unwrap();
        assert_eq!(out.get_f64("freq"), Some(300.0));
        let out = schema().validate(&ParameterSet::new().with("freq", -5.0)).unwrap();
        assert_eq!(out.get_f64("freq"), Some(1.0));
    }

    #[test]
    fn integer_and_float_inputs_normalize_equally() {
        let a = schema().validate(&ParameterSet::new().with("freq", 100)).unwrap();
        let b = schema().validate(&ParameterSet::new().with("freq", 100.0)).unwrap();
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn non_numeric_slider_is_rejected() {
        let err = schema()
            .validate(&ParameterSet::new().with("freq", "fast"))
            .unwrap_err();
        assert_eq!(
            err,
            ParamError::NotANumber {
                name: String::from("freq")
            }
        );
    }

    #[test]
    fn unknown_select_option_falls_back_to_first() {
        let out = schema()
            .validate(&ParameterSet::new().with("wave", "sawtooth"))
            .unwrap();
        assert_eq!(out.get("wave"), Some(&ParamValue::from("square")));
    }

    #[test]
    fn checkbox_uses_truthiness() {
        let out = schema()
            .validate(&ParameterSet::new().with("harmonics", 0))
            .unwrap();
        assert_eq!(out.get("harmonics"), Some(&ParamValue::Bool(false)));
    }

    #[test]
    fn undeclared_parameters_are_dropped() {
        let out = schema()
            .validate(&ParameterSet::new().with("bogus", 1))
            .unwrap();
        assert!(!out.contains("bogus"));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn required_parameter_without_default_errors() {
        let schema = ParameterSchema::new()
            .param(ParamSpec::slider("gain", "Gain", 0.0, 10.0, 1.0).required());
        let err = schema.validate(&ParameterSet::new()).unwrap_err();
        assert!(matches!(err, ParamError::Missing { .. }));
    }

    #[test]
    fn empty_schema_passes_parameters_through() {
        let params = ParameterSet::new().with("anything", 1);
        assert_eq!(ParameterSchema::new().validate(&params).unwrap(), params);
    }

    #[test]
    fn schema_serializes_for_catalog() {
        let json = serde_json::to_value(schema()).unwrap();
        assert_eq!(json[0]["name"], "freq");
        assert_eq!(json[0]["type"], "slider");
        assert_eq!(json[0]["max"], 300.0);
        assert_eq!(json[0]["unit"], "Hz");
        assert_eq!(json[1]["options"][1], "sine");
    }
}
