//! CSV export of the plot traces in a serialized state.
//!
//! Every trace in `plots[].data[]` contributes an `{name}_x` and
//! `{name}_y` column pair. Rows are indexed from zero; a trace shorter
//! than the longest leaves its cells empty. A state without traces
//! exports as an empty document.

use serde_json::Value as Json;

/// Errors raised while writing CSV.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The CSV writer rejected a record.
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    /// The buffered output could not be recovered.
    #[error("csv flush failed: {0}")]
    Flush(String),
}

struct Column<'a> {
    name: &'a str,
    x: &'a [Json],
    y: &'a [Json],
}

fn columns(state: &Json) -> Vec<Column<'_>> {
    let empty: &[Json] = &[];
    state
        .get("plots")
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
        .filter_map(|plot| plot.get("data").and_then(Json::as_array))
        .flatten()
        .map(|trace| Column {
            name: trace.get("name").and_then(Json::as_str).unwrap_or("data"),
            x: trace
                .get("x")
                .and_then(Json::as_array)
                .map_or(empty, Vec::as_slice),
            y: trace
                .get("y")
                .and_then(Json::as_array)
                .map_or(empty, Vec::as_slice),
        })
        .collect()
}

fn cell(values: &[Json], row: usize) -> String {
    match values.get(row) {
        None | Some(Json::Null) => String::new(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render the traces of `state` as CSV bytes.
pub fn plots_to_csv(state: &Json) -> Result<Vec<u8>, ExportError> {
    let columns = columns(state);
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![String::from("index")];
    for col in &columns {
        header.push(format!("{}_x", col.name));
        header.push(format!("{}_y", col.name));
    }
    writer.write_record(&header)?;

    let rows = columns
        .iter()
        .map(|c| c.x.len().max(c.y.len()))
        .max()
        .unwrap_or(0);
    for row in 0..rows {
        let mut record = vec![row.to_string()];
        for col in &columns {
            record.push(cell(col.x, row));
            record.push(cell(col.y, row));
        }
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))
}
