pub mod csv_out;
pub mod json;
pub mod markdown;
pub mod minimal;
pub mod table;

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::OutputFormat;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
        OutputFormat::Markdown => markdown::print_markdown(value),
    }
}

/// (field, header) for metric records in tabular formats.
pub const RECORD_COLUMNS: [(&str, &str); 10] = [
    ("name", "Entity"),
    ("account_label", "Account"),
    ("current_value", "Current Value"),
    ("total_invested", "Invested"),
    ("dollar_return", "Dollar Return"),
    ("roi", "ROI"),
    ("irr", "IRR"),
    ("holding_period_years", "Holding (yrs)"),
    ("allocation", "Allocation"),
    ("error", "Error"),
];

const PERCENT_FIELDS: [&str; 3] = ["roi", "irr", "allocation"];
const MONEY_FIELDS: [&str; 5] = [
    "current_value",
    "total_invested",
    "total_distributed",
    "cost_basis",
    "dollar_return",
];

pub const PORTFOLIO_SECTION: &str = "Portfolio";
pub const ACCOUNTS_SECTION: &str = "Accounts";
pub const ASSET_CLASSES_SECTION: &str = "Asset Classes";

/// The `result` of an output envelope, or the value itself.
pub fn result_of(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value)
}

/// Metric records grouped by section, for both table results and full reports.
pub fn record_sections(result: &Value) -> Vec<(String, Vec<&Value>)> {
    let mut sections = Vec::new();
    if let Some(records) = result.get("records").and_then(Value::as_array) {
        sections.push(("Records".to_string(), records.iter().collect()));
        return sections;
    }
    if result.get("breakdowns").is_none() {
        return sections;
    }

    if let Some(portfolio) = result.get("portfolio") {
        sections.push((PORTFOLIO_SECTION.to_string(), vec![portfolio]));
    }
    for (pointer, title) in [
        ("/accounts/records", ACCOUNTS_SECTION),
        ("/asset_classes/records", ASSET_CLASSES_SECTION),
    ] {
        if let Some(records) = result.pointer(pointer).and_then(Value::as_array) {
            sections.push((title.to_string(), records.iter().collect()));
        }
    }
    for breakdown in result
        .get("breakdowns")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let label = breakdown
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default();
        for (key, title) in [("asset_classes", "Asset Classes"), ("holdings", "Holdings")] {
            if let Some(records) = breakdown
                .get(key)
                .and_then(|t| t.get("records"))
                .and_then(Value::as_array)
            {
                sections.push((format!("{label}: {title}"), records.iter().collect()));
            }
        }
    }
    sections
}

/// Human-readable cell: percentages and money to 2 dp, undefined as N/A.
pub fn display_cell(field: &str, value: Option<&Value>) -> String {
    let value = match value {
        None | Some(Value::Null) => {
            return if matches!(field, "error" | "account_label") {
                String::new()
            } else {
                "N/A".to_string()
            };
        }
        Some(v) => v,
    };
    let number = match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    match number {
        Some(d) if PERCENT_FIELDS.contains(&field) => {
            format!("{:.2}%", (d * Decimal::ONE_HUNDRED).round_dp(2))
        }
        Some(d) if MONEY_FIELDS.contains(&field) => format!("{:.2}", d.round_dp(2)),
        Some(d) if field == "holding_period_years" => format!("{:.2}", d.round_dp(2)),
        _ => raw_cell(value),
    }
}

/// Cell text without any formatting; null is empty.
pub fn raw_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_cell_formats_by_field() {
        assert_eq!(display_cell("irr", Some(&json!("0.0741068"))), "7.41%");
        assert_eq!(display_cell("irr", Some(&Value::Null)), "N/A");
        assert_eq!(display_cell("irr", None), "N/A");
        assert_eq!(display_cell("error", None), "");
        assert_eq!(display_cell("current_value", Some(&json!("1100"))), "1100.00");
        assert_eq!(display_cell("name", Some(&json!("AAPL"))), "AAPL");
    }

    #[test]
    fn test_record_sections_for_report() {
        let report = json!({
            "valuation_date": "2024-01-02",
            "portfolio": { "name": "Portfolio" },
            "accounts": { "records": [{ "name": "A" }, { "name": "B" }] },
            "asset_classes": { "records": [{ "name": "Stock" }, { "name": "Bond" }, { "name": "Cash" }] },
            "breakdowns": [{
                "label": "Joint",
                "asset_classes": { "records": [{ "name": "Stock" }] },
                "holdings": { "records": [{ "name": "VTI" }] }
            }]
        });
        let sections = record_sections(&report);
        let titles: Vec<&str> = sections.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Portfolio",
                "Accounts",
                "Asset Classes",
                "Joint: Asset Classes",
                "Joint: Holdings"
            ]
        );
        assert_eq!(sections[1].1.len(), 2);
    }
}
