use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{display_cell, raw_cell, record_sections, result_of, RECORD_COLUMNS};

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    let result = result_of(value);
    let sections = record_sections(result);

    if sections.is_empty() {
        print_flat_object(result);
    } else {
        if let Some(date) = result.get("valuation_date").and_then(Value::as_str) {
            println!("Valuation date: {}\n", date);
        }
        for (title, records) in &sections {
            println!("{}", title);
            println!("{}\n", records_table(records));
        }
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// One row per metric record, with the fixed record columns.
pub fn records_table(records: &[&Value]) -> Table {
    let mut builder = Builder::default();
    builder.push_record(RECORD_COLUMNS.iter().map(|(_, header)| header.to_string()));
    for record in records {
        builder.push_record(
            RECORD_COLUMNS
                .iter()
                .map(|(field, _)| display_cell(field, record.get(*field))),
        );
    }
    Table::from(builder)
}

/// Two-column Field/Value table for any other object.
pub fn field_table(map: &serde_json::Map<String, Value>) -> Table {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.clone(), display_cell(key, Some(val))]);
    }
    Table::from(builder)
}

fn print_flat_object(value: &Value) {
    match value {
        Value::Object(map) => println!("{}", field_table(map)),
        other => println!("{}", raw_cell(other)),
    }
}
