use serde_json::Value;

use super::{display_cell, raw_cell, record_sections, result_of};

/// Print just the key answer.
///
/// Record tables print one `name: irr` line per row; a single result prints
/// the first defined priority field, falling back to the first field.
pub fn print_minimal(value: &Value) {
    for line in minimal_lines(value) {
        println!("{}", line);
    }
}

pub fn minimal_lines(value: &Value) -> Vec<String> {
    let result = result_of(value);

    let sections = record_sections(result);
    if let Some((_, records)) = sections.into_iter().next() {
        return records
            .iter()
            .map(|r| {
                let name = r.get("name").map(raw_cell).unwrap_or_default();
                format!("{}: {}", name, display_cell("irr", r.get("irr")))
            })
            .collect();
    }

    // Priority list of key output fields
    let priority_keys = ["irr", "roi", "dollar_return", "holding_period_years"];

    if let Value::Object(map) = result {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    return vec![raw_cell(val)];
                }
            }
        }
        if let Some((key, val)) = map.iter().next() {
            return vec![format!("{}: {}", key, raw_cell(val))];
        }
    }

    vec![raw_cell(result)]
}
