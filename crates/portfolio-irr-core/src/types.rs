use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary values. Single-currency (USD) ledger; wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// A single signed cash flow at a point in time.
///
/// Negative amounts are capital put in (buys, deposits); positive amounts are
/// value coming back (sales, dividends, withdrawals, terminal value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Set only on the synthetic valuation-date flow that closes a series.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
}

impl CashFlow {
    pub fn new(date: NaiveDate, amount: Money) -> Self {
        CashFlow {
            date,
            amount,
            label: None,
            terminal: false,
        }
    }

    pub fn labelled(date: NaiveDate, amount: Money, label: impl Into<String>) -> Self {
        CashFlow {
            date,
            amount,
            label: Some(label.into()),
            terminal: false,
        }
    }

    /// Closing flow of a series: the value still held at `date`.
    pub fn terminal(date: NaiveDate, amount: Money, label: impl Into<String>) -> Self {
        CashFlow {
            terminal: true,
            ..CashFlow::labelled(date, amount, label)
        }
    }
}

/// Broad asset category assigned to every position and transaction row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetClass {
    #[default]
    Stock,
    Bond,
    Cash,
}

impl AssetClass {
    pub const ALL: [AssetClass; 3] = [AssetClass::Stock, AssetClass::Bond, AssetClass::Cash];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stock => "Stock",
            AssetClass::Bond => "Bond",
            AssetClass::Cash => "Cash",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
