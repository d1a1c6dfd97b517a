//! Plotly-shaped plot builders.
//!
//! Simulators describe their output as a list of [`Plot`]s, each holding
//! scatter [`Trace`]s and a [`Layout`]. The builders produce raw
//! [`Value`]s so the result flows through the serializer like any other
//! simulator output.

use simgate_types::{NdArray, Value};

use crate::downsample::downsample;

/// Drawing mode of a scatter trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    /// Connected line.
    Lines,
    /// Discrete markers.
    Markers,
    /// Line with markers at each sample.
    LinesMarkers,
}

impl TraceMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Lines => "lines",
            Self::Markers => "markers",
            Self::LinesMarkers => "lines+markers",
        }
    }

    const fn has_lines(self) -> bool {
        matches!(self, Self::Lines | Self::LinesMarkers)
    }

    const fn has_markers(self) -> bool {
        matches!(self, Self::Markers | Self::LinesMarkers)
    }
}

/// A scatter trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    x: Vec<f64>,
    y: Vec<f64>,
    name: String,
    mode: TraceMode,
    line_color: Option<String>,
    line_width: f64,
    marker_size: f64,
    marker_color: Option<String>,
}

impl Trace {
    /// A line trace over `(x, y)`.
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            x,
            y,
            name: name.into(),
            mode: TraceMode::Lines,
            line_color: None,
            line_width: 2.0,
            marker_size: 8.0,
            marker_color: None,
        }
    }

    /// Set the drawing mode.
    #[must_use]
    pub const fn mode(mut self, mode: TraceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the line color and width.
    #[must_use]
    pub fn line(mut self, color: impl Into<String>, width: f64) -> Self {
        self.line_color = Some(color.into());
        self.line_width = width;
        self
    }

    /// Set the marker color and size.
    #[must_use]
    pub fn marker(mut self, color: impl Into<String>, size: f64) -> Self {
        self.marker_color = Some(color.into());
        self.marker_size = size;
        self
    }

    /// Reduce the trace to at most `max_points` samples, keeping peaks.
    #[must_use]
    pub fn max_points(mut self, max_points: usize) -> Self {
        let (x, y) = downsample(&self.x, &self.y, max_points, true);
        self.x = x;
        self.y = y;
        self
    }

    /// Number of samples in the trace.
    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    /// Whether the trace has no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plotly trace object.
    pub fn into_value(self) -> Value {
        let mut fields = vec![
            ("x", Value::from(NdArray::from_vec(self.x))),
            ("y", Value::from(NdArray::from_vec(self.y))),
            ("type", Value::from("scatter")),
            ("mode", Value::from(self.mode.as_str())),
            ("name", Value::from(self.name)),
        ];
        if self.mode.has_lines() {
            let mut line = vec![("width", Value::from(self.line_width))];
            if let Some(color) = self.line_color {
                line.push(("color", Value::from(color)));
            }
            fields.push(("line", Value::object(line)));
        }
        if self.mode.has_markers() {
            let mut marker = vec![("size", Value::from(self.marker_size))];
            if let Some(color) = self.marker_color {
                marker.push(("color", Value::from(color)));
            }
            fields.push(("marker", Value::object(marker)));
        }
        Value::object(fields)
    }
}

/// Axis scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisType {
    /// Linear scale.
    Linear,
    /// Base-10 logarithmic scale.
    Log,
}

impl AxisType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Log => "log",
        }
    }
}

/// One plot axis.
#[derive(Debug, Clone, PartialEq, Default)]
struct Axis {
    title: String,
    kind: Option<AxisType>,
    range: Option<(f64, f64)>,
}

impl Axis {
    fn into_value(self) -> Value {
        let mut fields = vec![("title", Value::from(self.title))];
        if let Some(kind) = self.kind {
            fields.push(("type", Value::from(kind.as_str())));
        }
        if let Some((lo, hi)) = self.range {
            fields.push(("range", Value::from(vec![lo, hi])));
        }
        Value::object(fields)
    }
}

/// Plot layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    title: String,
    xaxis: Axis,
    yaxis: Axis,
    show_legend: bool,
}

impl Layout {
    /// A layout with a title and axis labels.
    pub fn new(
        title: impl Into<String>,
        x_title: impl Into<String>,
        y_title: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            xaxis: Axis {
                title: x_title.into(),
                ..Axis::default()
            },
            yaxis: Axis {
                title: y_title.into(),
                ..Axis::default()
            },
            show_legend: true,
        }
    }

    /// Set the x-axis scale.
    #[must_use]
    pub const fn x_type(mut self, kind: AxisType) -> Self {
        self.xaxis.kind = Some(kind);
        self
    }

    /// Set the y-axis scale.
    #[must_use]
    pub const fn y_type(mut self, kind: AxisType) -> Self {
        self.yaxis.kind = Some(kind);
        self
    }

    /// Fix the x-axis range.
    #[must_use]
    pub const fn x_range(mut self, lo: f64, hi: f64) -> Self {
        self.xaxis.range = Some((lo, hi));
        self
    }

    /// Fix the y-axis range.
    #[must_use]
    pub const fn y_range(mut self, lo: f64, hi: f64) -> Self {
        self.yaxis.range = Some((lo, hi));
        self
    }

    /// Show or hide the legend.
    #[must_use]
    pub const fn legend(mut self, show: bool) -> Self {
        self.show_legend = show;
        self
    }

    /// Plotly layout object.
    pub fn into_value(self) -> Value {
        Value::object([
            ("title", Value::object([("text", Value::from(self.title))])),
            ("xaxis", self.xaxis.into_value()),
            ("yaxis", self.yaxis.into_value()),
            ("showlegend", Value::from(self.show_legend)),
        ])
    }
}

/// A titled plot: traces plus layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    id: String,
    title: String,
    traces: Vec<Trace>,
    layout: Layout,
}

impl Plot {
    /// A plot with the given identifier and layout.
    pub fn new(id: impl Into<String>, title: impl Into<String>, layout: Layout) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            traces: Vec::new(),
            layout,
        }
    }

    /// Append a trace.
    #[must_use]
    pub fn trace(mut self, trace: Trace) -> Self {
        self.traces.push(trace);
        self
    }

    /// `{id, title, data, layout}` object.
    pub fn into_value(self) -> Value {
        Value::object([
            ("id", Value::from(self.id)),
            ("title", Value::from(self.title)),
            (
                "data",
                Value::List(self.traces.into_iter().map(Trace::into_value).collect()),
            ),
            ("layout", self.layout.into_value()),
        ])
    }
}
