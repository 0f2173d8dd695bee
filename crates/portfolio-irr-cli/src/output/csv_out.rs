use serde_json::Value;
use std::io;

use super::{raw_cell, record_sections, result_of, RECORD_COLUMNS};

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    let _ = write_csv(&mut wtr, value);
    let _ = wtr.flush();
}

/// Metric records become one row each (with a section column); any other
/// result is written as field,value pairs. Numbers are left unformatted.
pub fn write_csv<W: io::Write>(wtr: &mut csv::Writer<W>, value: &Value) -> csv::Result<()> {
    let result = result_of(value);
    let sections = record_sections(result);

    if sections.is_empty() {
        wtr.write_record(["field", "value"])?;
        if let Value::Object(map) = result {
            for (key, val) in map {
                wtr.write_record([key.as_str(), raw_cell(val).as_str()])?;
            }
        } else {
            wtr.write_record(["result", raw_cell(result).as_str()])?;
        }
        return Ok(());
    }

    let mut header = vec!["section"];
    header.extend(RECORD_COLUMNS.iter().map(|(field, _)| *field));
    header.push("total_distributed");
    header.push("cost_basis");
    wtr.write_record(&header)?;

    for (section, records) in &sections {
        for record in records {
            let mut row = vec![section.clone()];
            row.extend(
                header[1..]
                    .iter()
                    .map(|field| record.get(*field).map(raw_cell).unwrap_or_default()),
            );
            wtr.write_record(&row)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_written_with_raw_values() {
        let envelope = json!({
            "result": {
                "records": [
                    { "name": "VTI", "current_value": "7100", "irr": "0.081234", "error": null },
                    { "name": "BND", "current_value": "0", "irr": null }
                ]
            }
        });
        let mut wtr = csv::Writer::from_writer(Vec::new());
        write_csv(&mut wtr, &envelope).unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("section,name,account_label,current_value"));
        assert!(lines[1].starts_with("Records,VTI,,7100,"));
        assert!(lines[1].contains("0.081234"));
    }
}
