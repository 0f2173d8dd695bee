use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PortfolioError;
use crate::types::{AssetClass, Money};
use crate::PortfolioResult;

/// One row of the normalised transaction history.
///
/// `amount` is signed from the account's point of view: negative when cash
/// leaves to buy an asset or transfer out, positive when cash or value comes in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub run_date: NaiveDate,
    pub account_number: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    pub amount: Money,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub asset_class: AssetClass,
}

/// One holding in the latest positions snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    pub current_value: Money,
    /// Absent for cash sweep vehicles; normalised to zero.
    #[serde(default)]
    pub cost_basis: Money,
    #[serde(default)]
    pub asset_class: AssetClass,
}

/// The two normalised tables plus the date every position is valued at.
///
/// Immutable once loaded: builders borrow it and produce owned series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioData {
    pub transactions: Vec<Transaction>,
    pub positions: Vec<Position>,
    pub valuation_date: NaiveDate,
}

impl PortfolioData {
    pub fn new(
        transactions: Vec<Transaction>,
        positions: Vec<Position>,
        valuation_date: NaiveDate,
    ) -> Self {
        PortfolioData {
            transactions,
            positions,
            valuation_date,
        }
    }

    /// Table-level integrity checks. A failure here aborts a whole batch.
    pub fn validate(&self) -> PortfolioResult<()> {
        if let Some(t) = self
            .transactions
            .iter()
            .find(|t| t.account_number.trim().is_empty())
        {
            return Err(PortfolioError::DataIntegrity {
                table: "transactions".into(),
                identifier: format!("{} {}", t.run_date, t.symbol),
                reason: "row has no account number".into(),
            });
        }
        if let Some(p) = self
            .positions
            .iter()
            .find(|p| p.account_number.trim().is_empty())
        {
            return Err(PortfolioError::DataIntegrity {
                table: "positions".into(),
                identifier: p.symbol.clone(),
                reason: "row has no account number".into(),
            });
        }

        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for p in &self.positions {
            if !seen.insert((p.account_number.as_str(), p.symbol.as_str())) {
                return Err(PortfolioError::DataIntegrity {
                    table: "positions".into(),
                    identifier: format!("{}/{}", p.account_number, p.symbol),
                    reason: "duplicate position row in one snapshot".into(),
                });
            }
        }

        if let Some(t) = self
            .transactions
            .iter()
            .find(|t| t.run_date > self.valuation_date)
        {
            return Err(PortfolioError::DateError(format!(
                "transaction on {} in account {} is after the valuation date {}",
                t.run_date, t.account_number, self.valuation_date
            )));
        }
        Ok(())
    }

    /// Account numbers in order of first appearance: positions first, then
    /// accounts that only appear in the history (fully closed accounts).
    pub fn accounts(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.positions
            .iter()
            .map(|p| p.account_number.as_str())
            .chain(self.transactions.iter().map(|t| t.account_number.as_str()))
            .filter(|a| seen.insert(*a))
            .map(str::to_string)
            .collect()
    }

    /// Whether an account appears in either table.
    pub fn has_account(&self, account: &str) -> bool {
        self.positions.iter().any(|p| p.account_number == account)
            || self.transactions.iter().any(|t| t.account_number == account)
    }

    /// Distinct non-blank symbols traded or held in an account: history order
    /// first, then positions with no history.
    pub fn symbols_in_account(&self, account: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.transactions_for(account)
            .map(|t| t.symbol.as_str())
            .chain(self.positions_for(account).map(|p| p.symbol.as_str()))
            .filter(|s| !s.trim().is_empty())
            .filter(|s| seen.insert(*s))
            .map(str::to_string)
            .collect()
    }

    pub fn transactions_for<'a>(
        &'a self,
        account: &'a str,
    ) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.transactions
            .iter()
            .filter(move |t| t.account_number == account)
    }

    pub fn positions_for<'a>(&'a self, account: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions
            .iter()
            .filter(move |p| p.account_number == account)
    }

    /// Display name recorded for an account in the positions snapshot, if any.
    pub fn account_name(&self, account: &str) -> Option<&str> {
        self.positions
            .iter()
            .filter(|p| p.account_number == account)
            .find_map(|p| p.account_name.as_deref())
    }

    /// Total market value of every position in the snapshot.
    pub fn total_market_value(&self) -> Money {
        self.positions.iter().map(|p| p.current_value).sum::<Decimal>()
    }
}
