use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{envelope_notes, json, result_records, Records};

/// Print the result as a table, then the methodology and any warnings or
/// defaults the run recorded. Results with no tabular shape print as JSON.
pub fn print_table(value: &Value) {
    let Some(records) = result_records(value) else {
        json::print_json(value);
        return;
    };
    println!("{}", render(&records));

    if let Some(methodology) = value.get("methodology").and_then(Value::as_str) {
        println!("\nMethodology: {methodology}");
    }
    let notes = envelope_notes(value);
    if !notes.is_empty() {
        println!();
        for note in notes {
            println!("  - {note}");
        }
    }
}

fn render(records: &Records) -> String {
    if records.rows.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(records.headers.clone());
    for row in &records.rows {
        builder.push_record(row.clone());
    }
    Table::from(builder).to_string()
}
