pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Cells laid out for the table and CSV writers.
#[derive(Debug, PartialEq)]
pub(crate) struct Records {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lay out an envelope's `result` as records.
///
/// Ledger, scenario and sweep results get one record per entry. A metrics
/// map, or the `metrics` of a full run, becomes metric/value pairs.
pub(crate) fn result_records(envelope: &Value) -> Option<Records> {
    let result = envelope.get("result")?;
    if let Some(rows) = tabular_rows(result) {
        return Some(records_from_rows(&rows));
    }
    let metrics = match result.get("metrics") {
        Some(Value::Object(m)) => m,
        _ => result.as_object()?,
    };
    Some(Records {
        headers: vec!["metric".into(), "value".into()],
        rows: metrics.iter().map(|(k, v)| vec![k.clone(), cell(v)]).collect(),
    })
}

/// Warnings and applied defaults carried alongside the result.
pub(crate) fn envelope_notes(envelope: &Value) -> Vec<String> {
    let strings = |key: &str| -> Vec<String> {
        envelope
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };
    let mut notes: Vec<String> = strings("warnings").into_iter().map(|w| format!("warning: {w}")).collect();
    notes.extend(strings("defaults_applied").into_iter().map(|d| format!("default: {d}")));
    notes
}

/// Columns are the union of keys in first-seen order; scenario rows that
/// failed carry no metrics, so the first row alone is not enough.
fn records_from_rows(rows: &[Value]) -> Records {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
    }
    let rows: Vec<Vec<String>> = rows
        .iter()
        .filter_map(Value::as_object)
        .map(|map| {
            headers
                .iter()
                .map(|h| map.get(h).map(cell).unwrap_or_default())
                .collect::<Vec<_>>()
        })
        .collect();
    Records { headers, rows }
}

pub(crate) fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Reshape results that are naturally tabular into one object per row:
/// ledger rows as-is, scenario outcomes flattened with their metrics, and
/// sensitivity points zipped with their metric values.
pub(crate) fn tabular_rows(result: &Value) -> Option<Vec<Value>> {
    match result {
        Value::Array(rows) => Some(rows.clone()),
        Value::Object(map) => {
            if let Some(Value::Array(outcomes)) = map.get("scenarios") {
                return Some(outcomes.iter().map(flatten_outcome).collect());
            }
            if let (Some(Value::Array(values)), Some(Value::Array(results))) =
                (map.get("values"), map.get("results"))
            {
                let variable = map.get("variable_name").cloned().unwrap_or(Value::Null);
                let metric = map.get("output_metric").cloned().unwrap_or(Value::Null);
                return Some(
                    values
                        .iter()
                        .zip(results)
                        .map(|(x, y)| {
                            let mut row = Map::new();
                            row.insert("variable".into(), variable.clone());
                            row.insert("value".into(), x.clone());
                            row.insert("metric".into(), metric.clone());
                            row.insert("result".into(), y.clone());
                            Value::Object(row)
                        })
                        .collect(),
                );
            }
            None
        }
        _ => None,
    }
}

fn flatten_outcome(outcome: &Value) -> Value {
    let mut row = Map::new();
    row.insert(
        "name".into(),
        outcome.get("name").cloned().unwrap_or(Value::Null),
    );
    row.insert(
        "error".into(),
        outcome.get("error").cloned().unwrap_or(Value::Null),
    );
    if let Some(Value::Object(metrics)) = outcome.get("metrics") {
        for (k, v) in metrics {
            row.insert(k.clone(), v.clone());
        }
    }
    Value::Object(row)
}
