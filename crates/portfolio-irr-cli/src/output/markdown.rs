use serde_json::Value;
use tabled::settings::Style;

use super::table::{field_table, records_table};
use super::{
    raw_cell, record_sections, result_of, ACCOUNTS_SECTION, ASSET_CLASSES_SECTION,
    PORTFOLIO_SECTION,
};

/// Print a Markdown report to stdout.
pub fn print_markdown(value: &Value) {
    println!("{}", render_markdown(value));
}

/// Full reports get the numbered portfolio, account, holding and asset class
/// sections; anything else is rendered as a single table.
pub fn render_markdown(value: &Value) -> String {
    let result = result_of(value);
    let mut out = Vec::new();

    out.push("# Portfolio Analysis Report".to_string());
    if let Some(date) = result.get("valuation_date").and_then(Value::as_str) {
        out.push(format!("**Date:** {}\n", date));
    }

    let sections = record_sections(result);
    if result.get("breakdowns").is_some() {
        let top = [PORTFOLIO_SECTION, ACCOUNTS_SECTION, ASSET_CLASSES_SECTION];
        let find = |wanted: &str| sections.iter().find(|(title, _)| title == wanted);

        if let Some((_, records)) = find(PORTFOLIO_SECTION) {
            out.push("## 1. Total Portfolio Performance".to_string());
            out.push(markdown_records(records));
        }
        if let Some((_, records)) = find(ACCOUNTS_SECTION) {
            out.push("## 2. Performance by Account".to_string());
            out.push(markdown_records(records));
        }
        out.push("## 3. Performance by Holding".to_string());
        for (title, records) in sections.iter().filter(|(t, _)| !top.contains(&t.as_str())) {
            out.push(format!("### {}", title));
            out.push(markdown_records(records));
        }
        if let Some((_, records)) = find(ASSET_CLASSES_SECTION) {
            out.push("## 4. Performance by Asset Class".to_string());
            out.push(markdown_records(records));
        }
    } else if let Some((_, records)) = sections.first() {
        out.push(markdown_records(records));
    } else if let Value::Object(map) = result {
        out.push(field_table(map).with(Style::markdown()).to_string());
    } else {
        out.push(raw_cell(result));
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            out.push("\n## Warnings".to_string());
            for w in warnings.iter().filter_map(Value::as_str) {
                out.push(format!("- {}", w));
            }
        }
    }

    out.join("\n")
}

fn markdown_records(records: &[&Value]) -> String {
    format!("{}\n", records_table(records).with(Style::markdown()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_has_four_numbered_sections() {
        let envelope = json!({
            "result": {
                "valuation_date": "2024-01-02",
                "portfolio": { "name": "Portfolio", "irr": "0.1", "current_value": "10" },
                "accounts": { "records": [{ "name": "A", "irr": null }] },
                "asset_classes": { "records": [{ "name": "Bond", "allocation": "0.25" }] },
                "breakdowns": [{
                    "label": "Joint",
                    "asset_classes": { "records": [{ "name": "Stock" }] },
                    "holdings": { "records": [{ "name": "VTI" }] }
                }]
            },
            "warnings": ["A: IRR undefined (cash flows are all the same sign)"]
        });
        let md = render_markdown(&envelope);
        assert!(md.contains("**Date:** 2024-01-02"));
        assert!(md.contains("## 1. Total Portfolio Performance"));
        assert!(md.contains("## 2. Performance by Account"));
        assert!(md.contains("### Joint: Holdings"));
        assert!(!md.contains("### Asset Classes"));
        let classes = md.find("## 4. Performance by Asset Class").unwrap();
        assert!(classes > md.find("### Joint: Holdings").unwrap());
        assert!(md[classes..].contains("25.00%"));
        assert!(md.contains("10.00%"));
        assert!(md.contains("N/A"));
        assert!(md.contains("- A: IRR undefined"));
    }
}
