use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classification::ClassificationRules;
use crate::data::PortfolioData;
use crate::error::PortfolioError;
use crate::types::Money;
use crate::PortfolioResult;

pub use crate::time_value::{SolverConfig, SolverMethod};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How contributions show up in an account's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Ordinary brokerage: buys are negative, sales/dividends positive.
    #[default]
    Brokerage,
    /// Employer plans (401k etc.): a payroll contribution is booked as a positive
    /// amount against the fund it buys, but it is capital going in.
    Retirement,
}

/// One entry of the account registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub number: String,
    pub label: String,
    #[serde(default)]
    pub kind: AccountKind,
}

/// Keyword lists that decide whether a ledger row is external funding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingRules {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for FundingRules {
    fn default() -> Self {
        FundingRules {
            include: to_strings(&[
                "ELECTRONIC FUNDS TRANSFER",
                "CHECK RECEIVED",
                "DEPOSIT",
                "WIRE",
                "BILL PAY",
                "CONTRIB",
                "PARTIC CONTR",
                "JOURNALED",
                "TRANSFER",
            ]),
            exclude: to_strings(&[
                "DIVIDEND",
                "INTEREST",
                "REINVESTMENT",
                "YOU BOUGHT",
                "YOU SOLD",
                "REDEMPTION",
                "FEE",
                "EXCHANGE",
                "CASH RESERVES",
                "GAIN",
                "LOSS",
            ]),
        }
    }
}

impl FundingRules {
    /// Matches the action text, or the description when the action is blank.
    pub fn is_funding(&self, action: &str, description: &str) -> bool {
        let text = if action.trim().is_empty() {
            description
        } else {
            action
        };
        let text = text.to_uppercase();
        contains_any(&text, &self.include) && !contains_any(&text, &self.exclude)
    }
}

/// Synthetic seed investment for an account whose history carries no usable
/// funding rows. A data-quality patch for a known gap, keyed by account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingOverride {
    pub account: String,
    pub date: NaiveDate,
    /// Capital put in on `date` (positive).
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Everything the analyses need besides the two tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub accounts: Vec<AccountProfile>,
    pub funding: FundingRules,
    pub contribution_keywords: Vec<String>,
    /// Account-name substrings that register an unlisted account as `Retirement`.
    pub retirement_name_keywords: Vec<String>,
    pub funding_overrides: Vec<FundingOverride>,
    pub ignored_symbols: Vec<String>,
    pub solver: SolverConfig,
    pub classification: ClassificationRules,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            accounts: Vec::new(),
            funding: FundingRules::default(),
            contribution_keywords: to_strings(&["CONTRIB", "PARTIC CONTR"]),
            retirement_name_keywords: to_strings(&["401K", "401(K)", "403B", "403(B)"]),
            funding_overrides: Vec::new(),
            ignored_symbols: to_strings(&["Pending activity", "Pending Activity", ""]),
            solver: SolverConfig::default(),
            classification: ClassificationRules::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

impl AnalysisConfig {
    /// Registry entry for an account. Unknown accounts are an integrity error:
    /// the account kind changes sign conventions, so it is never guessed.
    pub fn account(&self, number: &str) -> PortfolioResult<&AccountProfile> {
        self.accounts
            .iter()
            .find(|a| a.number == number)
            .ok_or_else(|| PortfolioError::DataIntegrity {
                table: "account registry".into(),
                identifier: number.to_string(),
                reason: "account is not registered".into(),
            })
    }

    pub fn account_label(&self, number: &str) -> Option<&str> {
        self.accounts
            .iter()
            .find(|a| a.number == number)
            .map(|a| a.label.as_str())
    }

    pub fn funding_override(&self, account: &str) -> Option<&FundingOverride> {
        self.funding_overrides.iter().find(|o| o.account == account)
    }

    pub fn is_ignored_symbol(&self, symbol: &str) -> bool {
        let symbol = symbol.trim();
        self.ignored_symbols.iter().any(|s| s.trim() == symbol)
    }

    pub fn is_contribution(&self, action: &str) -> bool {
        contains_any(&action.to_uppercase(), &self.contribution_keywords)
    }

    /// Register every account present in the data but missing from the
    /// registry, labelled from the positions snapshot. The kind is
    /// `Retirement` when the account name matches `retirement_name_keywords`,
    /// otherwise `Brokerage`.
    pub fn register_missing_accounts(&mut self, data: &PortfolioData) {
        for number in data.accounts() {
            if self.accounts.iter().any(|a| a.number == number) {
                continue;
            }
            let name = data.account_name(&number);
            let kind = match name {
                Some(n) if contains_any(&n.to_uppercase(), &self.retirement_name_keywords) => {
                    AccountKind::Retirement
                }
                _ => AccountKind::Brokerage,
            };
            let label = name.map(str::to_string).unwrap_or_else(|| number.clone());
            debug!(account = %number, %label, ?kind, "registering unlisted account");
            self.accounts.push(AccountProfile {
                number,
                label,
                kind,
            });
        }
    }

    /// Check the configuration against the loaded tables.
    pub fn validate(&self, data: &PortfolioData) -> PortfolioResult<()> {
        let mut numbers = HashSet::new();
        for a in &self.accounts {
            if !numbers.insert(a.number.as_str()) {
                return Err(PortfolioError::InvalidInput {
                    field: "accounts".into(),
                    reason: format!("account {} is registered twice", a.number),
                });
            }
        }

        let mut overridden = HashSet::new();
        for o in &self.funding_overrides {
            if !overridden.insert(o.account.as_str()) {
                return Err(PortfolioError::InvalidInput {
                    field: "funding_overrides".into(),
                    reason: format!("account {} has more than one override", o.account),
                });
            }
            if !data.has_account(&o.account) {
                return Err(PortfolioError::DataIntegrity {
                    table: "funding overrides".into(),
                    identifier: o.account.clone(),
                    reason: "override names an account absent from positions and history"
                        .into(),
                });
            }
            if o.amount <= Decimal::ZERO {
                return Err(PortfolioError::InvalidInput {
                    field: "funding_overrides.amount".into(),
                    reason: format!("seed investment for {} must be positive", o.account),
                });
            }
            if o.date > data.valuation_date {
                return Err(PortfolioError::DateError(format!(
                    "override for {} is dated after the valuation date",
                    o.account
                )));
            }
        }

        let s = &self.solver;
        if s.lower_bound <= Decimal::NEGATIVE_ONE || s.lower_bound >= s.upper_bound {
            return Err(PortfolioError::InvalidInput {
                field: "solver".into(),
                reason: "bounds must satisfy -1 < lower_bound < upper_bound".into(),
            });
        }
        if s.max_iterations == 0 {
            return Err(PortfolioError::InvalidInput {
                field: "solver.max_iterations".into(),
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Case-insensitive substring test; `haystack_upper` must already be upper-case.
fn contains_any(haystack_upper: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .filter(|n| !n.is_empty())
        .any(|n| haystack_upper.contains(n.to_uppercase().as_str()))
}
