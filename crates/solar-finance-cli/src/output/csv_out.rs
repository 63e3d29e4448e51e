use serde_json::Value;
use std::io;

use super::{envelope_notes, json, result_records, Records};

/// Write the result as CSV on stdout. Warnings and defaults go to the log so
/// stdout stays machine-readable.
pub fn print_csv(value: &Value) {
    let Some(records) = result_records(value) else {
        json::print_json(value);
        return;
    };
    for note in envelope_notes(value) {
        log::warn!("{note}");
    }
    if let Err(e) = write_records(io::stdout().lock(), &records) {
        eprintln!("CSV write error: {e}");
    }
}

fn write_records<W: io::Write>(out: W, records: &Records) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(&records.headers)?;
    for row in &records.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn written(envelope: &Value) -> String {
        let mut buf = Vec::new();
        write_records(&mut buf, &result_records(envelope).unwrap()).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_metrics_written_as_pairs() {
        let out = written(&json!({"result": {"lcoe_nominal": "61.2", "project_npv_nominal": "undefined"}}));
        assert_eq!(out, "metric,value\nlcoe_nominal,61.2\nproject_npv_nominal,undefined\n");
    }

    #[test]
    fn test_scenario_error_with_comma_is_quoted() {
        let out = written(&json!({
            "result": {"scenarios": [{"name": "bad", "error": "Configuration error: ac_kw, must be positive"}]}
        }));
        assert_eq!(out, "error,name\n\"Configuration error: ac_kw, must be positive\",bad\n");
    }
}
