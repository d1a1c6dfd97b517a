//! RC low-pass filter driven by a square wave.
//!
//! The time-domain response integrates `dV/dt = (Vin - V) / RC` with
//! fourth-order Runge-Kutta over a 50 ms window. The frequency view is the
//! first-order magnitude response `|H| = 1 / sqrt(1 + (wRC)^2)` with the
//! input's odd harmonics overlaid.

use std::f64::consts::PI;

use simgate_core::plot::{AxisType, Layout, Plot, Trace, TraceMode};
use simgate_core::simulator::{ParamSpec, ParameterSchema, Simulator, SimulatorError};
use simgate_types::{ParameterSet, SimulationInfo, Value};

/// Simulation identifier.
pub const ID: &str = "rc_filter";

const TIME_WINDOW_S: f64 = 0.05;
const TIME_SAMPLES: usize = 1000;
const BODE_POINTS: usize = 500;
const BODE_DECADES: (f64, f64) = (-1.0, 5.0);
const MAX_HARMONIC: u32 = 39;
const FLOOR_DB: f64 = -80.0;
const CEIL_DB: f64 = 30.0;

/// The RC low-pass filter simulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RcFilter;

impl Simulator for RcFilter {
    fn info(&self) -> SimulationInfo {
        SimulationInfo {
            id: String::from(ID),
            name: String::from("RC Lowpass Filter"),
            description: String::from(
                "Square wave through a first-order RC low-pass filter, in time and frequency.",
            ),
            category: String::from("circuits"),
        }
    }

    fn schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .param(
                ParamSpec::slider("freq", "Input Frequency", 1.0, 300.0, 100.0)
                    .step(1.0)
                    .unit("Hz"),
            )
            .param(
                ParamSpec::slider("rc_ms", "RC Time Constant", 0.1, 10.0, 1.0)
                    .step(0.01)
                    .unit("ms"),
            )
            .param(
                ParamSpec::slider("amplitude", "Amplitude", 1.0, 10.0, 5.0)
                    .step(0.1)
                    .unit("V"),
            )
    }

    fn get_state(&self, params: &ParameterSet) -> Result<Value, SimulatorError> {
        let freq = positive(params, "freq", 100.0)?;
        let rc_ms = positive(params, "rc_ms", 1.0)?;
        let amplitude = params.get_f64("amplitude").unwrap_or(5.0);
        let rc = rc_ms / 1000.0;

        let t = linspace(0.0, TIME_WINDOW_S, TIME_SAMPLES);
        let input: Vec<f64> = t
            .iter()
            .map(|ti| amplitude * (2.0 * PI * freq * ti).sin().signum_or_zero())
            .collect();
        let output = rk4_response(&t, &input, rc);
        let t_ms: Vec<f64> = t.iter().map(|v| v * 1000.0).collect();

        let cutoff = 1.0 / (2.0 * PI * rc);
        let ratio = freq / cutoff;

        let time_plot = Plot::new(
            "time_domain",
            "Time Domain Response",
            Layout::new("", "Time (ms)", "Voltage (V)")
                .x_range(0.0, TIME_WINDOW_S * 1000.0)
                .y_range(-11.0, 11.0),
        )
        .trace(Trace::new("Input (Square Wave)", t_ms.clone(), input).line("#3b82f6", 2.5))
        .trace(Trace::new("Output (Filtered)", t_ms, output).line("#ef4444", 2.5));

        let (bode_f, bode_db) = bode(rc);
        let (harm_f, harm_db) = harmonics(freq, amplitude);
        let bode_plot = Plot::new(
            "bode",
            "Frequency Response (Bode Plot)",
            Layout::new("", "Frequency (Hz)", "Magnitude (dB)")
                .x_type(AxisType::Log)
                .x_range(BODE_DECADES.0, BODE_DECADES.1)
                .y_range(FLOOR_DB, CEIL_DB),
        )
        .trace(Trace::new("Filter Response", bode_f, bode_db).line("#3b82f6", 2.5))
        .trace(
            Trace::new(
                format!("Cutoff fc={cutoff:.0}Hz"),
                vec![cutoff, cutoff],
                vec![FLOOR_DB, CEIL_DB],
            )
            .line("#10b981", 2.5),
        )
        .trace(
            Trace::new("Square Wave Harmonics", harm_f, harm_db)
                .mode(TraceMode::Markers)
                .marker("#ef4444", 8.0),
        );

        Ok(Value::object([
            ("parameters", Value::from(params.to_json())),
            (
                "plots",
                Value::List(vec![time_plot.into_value(), bode_plot.into_value()]),
            ),
            (
                "metadata",
                Value::object([
                    ("simulation_type", Value::from(ID)),
                    ("cutoff_freq", Value::from(round1(cutoff))),
                    ("status", Value::from(status(ratio))),
                    ("ratio", Value::from((ratio * 100.0).round() / 100.0)),
                    ("transfer_function", Value::transfer_function(&[1.0], &[rc, 1.0])),
                ]),
            ),
        ]))
    }
}

fn positive(params: &ParameterSet, name: &str, default: f64) -> Result<f64, SimulatorError> {
    let value = params.get_f64(name).unwrap_or(default);
    if value > 0.0 {
        Ok(value)
    } else {
        Err(SimulatorError::InvalidValue(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn status(ratio: f64) -> &'static str {
    if ratio < 0.3 {
        "PASSING"
    } else if ratio < 1.5 {
        "TRANSITIONING"
    } else {
        "FILTERING"
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

trait SignumOrZero {
    fn signum_or_zero(self) -> f64;
}

impl SignumOrZero for f64 {
    /// Sign with `0.0` mapping to `0.0`, unlike [`f64::signum`].
    fn signum_or_zero(self) -> f64 {
        if self > 0.0 {
            1.0
        } else if self < 0.0 {
            -1.0
        } else {
            0.0
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::arithmetic_side_effects)]
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![start; n];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| (i as f64).mul_add(step, start)).collect()
}

fn rk4_response(t: &[f64], input: &[f64], rc: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(t.len());
    let mut v = 0.0_f64;
    out.push(v);
    for (tw, iw) in t.windows(2).zip(input.windows(2)) {
        let (&[t0, t1], &[v_in, v_next]) = (tw, iw) else {
            continue;
        };
        let dt = t1 - t0;
        let v_mid = (v_in + v_next) / 2.0;
        let k1 = (v_in - v) / rc;
        let k2 = (v_mid - k1.mul_add(dt / 2.0, v)) / rc;
        let k3 = (v_mid - k2.mul_add(dt / 2.0, v)) / rc;
        let k4 = (v_next - k3.mul_add(dt, v)) / rc;
        v += (dt / 6.0) * (2.0f64.mul_add(k3, 2.0f64.mul_add(k2, k1)) + k4);
        out.push(v);
    }
    out
}

fn bode(rc: f64) -> (Vec<f64>, Vec<f64>) {
    let freqs: Vec<f64> = linspace(BODE_DECADES.0, BODE_DECADES.1, BODE_POINTS)
        .into_iter()
        .map(|e| 10_f64.powf(e))
        .collect();
    let mags = freqs
        .iter()
        .map(|f| {
            let wrc = 2.0 * PI * f * rc;
            20.0 * (1.0 / wrc.mul_add(wrc, 1.0).sqrt()).log10()
        })
        .collect();
    (freqs, mags)
}

fn harmonics(fundamental: f64, amplitude: f64) -> (Vec<f64>, Vec<f64>) {
    let (lo, hi) = (10_f64.powf(BODE_DECADES.0), 10_f64.powf(BODE_DECADES.1));
    (1..=MAX_HARMONIC)
        .step_by(2)
        .map(f64::from)
        .map(|n| (n * fundamental, 20.0 * ((4.0 * amplitude) / (n * PI)).log10()))
        .filter(|(f, _)| (lo..=hi).contains(f))
        .unzip()
}
