pub mod builder;

#[cfg(feature = "aggregation")]
pub mod aggregate;

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{AssetClass, CashFlow, Money};

pub use builder::CashFlowBuilder;

/// Label carried by the synthetic valuation-date flow.
pub const TERMINAL_LABEL: &str = "current value";

/// The unit a cash-flow series is built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// One symbol inside one account.
    Symbol { account: String, symbol: String },
    /// Every holding of one asset class inside one account.
    AssetClass {
        account: String,
        asset_class: AssetClass,
    },
    /// A whole account, measured by its external funding.
    Account { account: String },
    /// One asset class across every account.
    PortfolioAssetClass { asset_class: AssetClass },
    /// All accounts together.
    Portfolio,
}

impl Entity {
    pub fn symbol(account: impl Into<String>, symbol: impl Into<String>) -> Self {
        Entity::Symbol {
            account: account.into(),
            symbol: symbol.into(),
        }
    }

    pub fn asset_class(account: impl Into<String>, asset_class: AssetClass) -> Self {
        Entity::AssetClass {
            account: account.into(),
            asset_class,
        }
    }

    pub fn account(account: impl Into<String>) -> Self {
        Entity::Account {
            account: account.into(),
        }
    }

    pub fn portfolio_asset_class(asset_class: AssetClass) -> Self {
        Entity::PortfolioAssetClass { asset_class }
    }

    /// The account this entity lives in, if it is account-scoped.
    pub fn account_number(&self) -> Option<&str> {
        match self {
            Entity::Symbol { account, .. }
            | Entity::AssetClass { account, .. }
            | Entity::Account { account } => Some(account),
            Entity::PortfolioAssetClass { .. } | Entity::Portfolio => None,
        }
    }

    /// Short display name: the symbol, the asset class, the account, or "Portfolio".
    pub fn name(&self) -> String {
        match self {
            Entity::Symbol { symbol, .. } => symbol.clone(),
            Entity::AssetClass { asset_class, .. }
            | Entity::PortfolioAssetClass { asset_class } => asset_class.to_string(),
            Entity::Account { account } => account.clone(),
            Entity::Portfolio => "Portfolio".to_string(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Symbol { account, symbol } => write!(f, "{account}/{symbol}"),
            Entity::AssetClass {
                account,
                asset_class,
            } => write!(f, "{account}/{asset_class}"),
            Entity::Account { account } => f.write_str(account),
            Entity::PortfolioAssetClass { asset_class } => write!(f, "Portfolio/{asset_class}"),
            Entity::Portfolio => f.write_str("Portfolio"),
        }
    }
}

/// Dated, signed cash flows for one entity plus its terminal valuation.
///
/// `flows` always holds at least one terminal flow dated `valuation_date`
/// (zero when nothing is held). Flows are not sorted. Aggregates hold one
/// terminal flow per constituent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySeries {
    pub entity: Entity,
    pub flows: Vec<CashFlow>,
    /// Sum of |amount| over negative flows.
    pub total_invested: Money,
    /// Sum of positive historical flows (sales, dividends, withdrawals).
    pub total_distributed: Money,
    /// Market value at `valuation_date`.
    pub current_value: Money,
    /// Cost basis of the positions still held.
    pub cost_basis: Money,
    pub valuation_date: NaiveDate,
}

impl EntitySeries {
    /// Build a series from historical flows, appending the terminal flow.
    pub fn from_history(
        entity: Entity,
        history: Vec<CashFlow>,
        current_value: Money,
        cost_basis: Money,
        valuation_date: NaiveDate,
    ) -> Self {
        let total_invested = history
            .iter()
            .filter(|cf| cf.amount < Decimal::ZERO)
            .map(|cf| cf.amount.abs())
            .sum::<Decimal>();
        let total_distributed = history
            .iter()
            .filter(|cf| cf.amount > Decimal::ZERO)
            .map(|cf| cf.amount)
            .sum::<Decimal>();

        let mut flows = history;
        flows.push(CashFlow::terminal(
            valuation_date,
            current_value,
            TERMINAL_LABEL,
        ));

        EntitySeries {
            entity,
            flows,
            total_invested,
            total_distributed,
            current_value,
            cost_basis,
            valuation_date,
        }
    }

    /// Flows before the terminal valuation flow(s).
    pub fn historical_flows(&self) -> impl Iterator<Item = &CashFlow> {
        self.flows
            .iter()
            .filter(|cf| !cf.terminal)
    }

    /// Capital contributions: the negative historical flows.
    pub fn contributions(&self) -> impl Iterator<Item = &CashFlow> {
        self.historical_flows()
            .filter(|cf| cf.amount < Decimal::ZERO)
    }
}
