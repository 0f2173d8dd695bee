use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::cash_flows::{Entity, EntitySeries};
use crate::config::{AccountKind, AnalysisConfig};
use crate::data::{PortfolioData, Position, Transaction};
use crate::types::{AssetClass, CashFlow, Money};
use crate::PortfolioResult;

/// Builds entity cash-flow series from borrowed, read-only tables.
///
/// Every call produces a fresh owned [`EntitySeries`]; nothing in `data` is
/// copied wholesale or mutated.
#[derive(Debug, Clone, Copy)]
pub struct CashFlowBuilder<'a> {
    data: &'a PortfolioData,
    config: &'a AnalysisConfig,
}

impl<'a> CashFlowBuilder<'a> {
    pub fn new(data: &'a PortfolioData, config: &'a AnalysisConfig) -> Self {
        CashFlowBuilder { data, config }
    }

    pub fn data(&self) -> &'a PortfolioData {
        self.data
    }

    pub fn config(&self) -> &'a AnalysisConfig {
        self.config
    }

    /// Build the series for any entity kind.
    pub fn build(&self, entity: &Entity) -> PortfolioResult<EntitySeries> {
        match entity {
            Entity::Symbol { account, symbol } => self.symbol(account, symbol),
            Entity::AssetClass {
                account,
                asset_class,
            } => self.asset_class(account, *asset_class),
            Entity::Account { account } => self.account(account),
            #[cfg(feature = "aggregation")]
            Entity::PortfolioAssetClass { asset_class } => self.portfolio_asset_class(*asset_class),
            #[cfg(feature = "aggregation")]
            Entity::Portfolio => self.portfolio(),
            #[cfg(not(feature = "aggregation"))]
            Entity::PortfolioAssetClass { .. } | Entity::Portfolio => {
                Err(crate::error::PortfolioError::InvalidInput {
                    field: "entity".into(),
                    reason: "portfolio series require the `aggregation` feature".into(),
                })
            }
        }
    }

    /// One symbol inside one account: every matching ledger row is a flow.
    pub fn symbol(&self, account: &str, symbol: &str) -> PortfolioResult<EntitySeries> {
        let kind = self.config.account(account)?.kind;
        let entity = Entity::symbol(account, symbol);
        let series = self.trade_series(
            entity,
            kind,
            self.data.transactions_for(account).filter(|t| t.symbol == symbol),
            self.data.positions_for(account).filter(|p| p.symbol == symbol),
        );
        debug!(entity = %series.entity, flows = series.flows.len(), "built symbol series");
        Ok(series)
    }

    /// Every holding tagged with `asset_class` inside one account.
    pub fn asset_class(
        &self,
        account: &str,
        asset_class: AssetClass,
    ) -> PortfolioResult<EntitySeries> {
        let kind = self.config.account(account)?.kind;
        let entity = Entity::asset_class(account, asset_class);
        let series = self.trade_series(
            entity,
            kind,
            self.data
                .transactions_for(account)
                .filter(|t| t.asset_class == asset_class),
            self.data
                .positions_for(account)
                .filter(|p| p.asset_class == asset_class),
        );
        debug!(entity = %series.entity, flows = series.flows.len(), "built asset class series");
        Ok(series)
    }

    /// A whole account, measured by external funding only.
    ///
    /// Deposits are booked positive in the ledger but are capital going in,
    /// so funding flows are negated. Accounts listed in the override table get
    /// their synthetic seed investment instead of history.
    pub fn account(&self, account: &str) -> PortfolioResult<EntitySeries> {
        self.config.account(account)?;
        let entity = Entity::account(account);
        let (current_value, cost_basis) = holdings_value(self.data.positions_for(account));

        if let Some(seed) = self.config.funding_override(account) {
            warn!(
                account,
                date = %seed.date,
                amount = %seed.amount,
                "using funding override instead of ledger history"
            );
            let label = seed
                .note
                .clone()
                .unwrap_or_else(|| "funding override".to_string());
            return Ok(EntitySeries::from_history(
                entity,
                vec![CashFlow::labelled(seed.date, -seed.amount, label)],
                current_value,
                cost_basis,
                self.data.valuation_date,
            ));
        }

        let funding = &self.config.funding;
        let history: Vec<CashFlow> = self
            .data
            .transactions_for(account)
            .filter(|t| !t.amount.is_zero())
            .filter(|t| funding.is_funding(&t.action, &t.description))
            .map(|t| history_flow(t, -t.amount))
            .collect();

        debug!(account, flows = history.len(), "built account funding series");
        Ok(EntitySeries::from_history(
            entity,
            history,
            current_value,
            cost_basis,
            self.data.valuation_date,
        ))
    }

    /// Signed flow for a trade-level row.
    ///
    /// In retirement accounts a contribution is booked positive against the
    /// fund it buys; it is still capital in, so it becomes an outflow.
    pub fn trade_flow(&self, kind: AccountKind, txn: &Transaction) -> Money {
        match kind {
            AccountKind::Retirement
                if txn.amount > Decimal::ZERO && self.config.is_contribution(&txn.action) =>
            {
                -txn.amount
            }
            _ => txn.amount,
        }
    }

    fn trade_series<'t, T, P>(
        &self,
        entity: Entity,
        kind: AccountKind,
        transactions: T,
        positions: P,
    ) -> EntitySeries
    where
        T: Iterator<Item = &'t Transaction>,
        P: Iterator<Item = &'t Position>,
    {
        let history: Vec<CashFlow> = transactions
            .map(|t| history_flow(t, self.trade_flow(kind, t)))
            .collect();
        let (current_value, cost_basis) = holdings_value(positions);
        EntitySeries::from_history(
            entity,
            history,
            current_value,
            cost_basis,
            self.data.valuation_date,
        )
    }
}

fn history_flow(txn: &Transaction, amount: Money) -> CashFlow {
    if txn.action.trim().is_empty() {
        CashFlow::new(txn.run_date, amount)
    } else {
        CashFlow::labelled(txn.run_date, amount, txn.action.trim())
    }
}

/// (current value, cost basis) summed over positions; zero when none match.
fn holdings_value<'p>(positions: impl Iterator<Item = &'p Position>) -> (Money, Money) {
    positions.fold((Decimal::ZERO, Decimal::ZERO), |(value, basis), p| {
        (value + p.current_value, basis + p.cost_basis)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountProfile, FundingOverride};
    use chrono::{Duration, NaiveDate};
    use rust_decimal_macros::dec;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(n)
    }

    fn txn(account: &str, symbol: &str, n: i64, amount: Money, action: &str) -> Transaction {
        Transaction {
            run_date: day(n),
            account_number: account.into(),
            symbol: symbol.into(),
            description: String::new(),
            amount,
            action: action.into(),
            asset_class: AssetClass::Stock,
        }
    }

    fn config_for(accounts: &[(&str, AccountKind)]) -> AnalysisConfig {
        AnalysisConfig {
            accounts: accounts
                .iter()
                .map(|(n, k)| AccountProfile {
                    number: n.to_string(),
                    label: n.to_string(),
                    kind: *k,
                })
                .collect(),
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_symbol_series_appends_terminal_value() {
        let data = PortfolioData::new(
            vec![
                txn("A", "X", 0, dec!(-1000), "YOU BOUGHT"),
                txn("A", "X", 365, dec!(50), "DIVIDEND RECEIVED"),
                txn("A", "Y", 10, dec!(-5), "YOU BOUGHT"),
            ],
            vec![Position {
                account_number: "A".into(),
                account_name: None,
                symbol: "X".into(),
                description: String::new(),
                current_value: dec!(1100),
                cost_basis: dec!(1000),
                asset_class: AssetClass::Stock,
            }],
            day(730),
        );
        let config = config_for(&[("A", AccountKind::Brokerage)]);
        let series = CashFlowBuilder::new(&data, &config).symbol("A", "X").unwrap();

        assert_eq!(series.flows.len(), 3);
        assert_eq!(series.total_invested, dec!(1000));
        assert_eq!(series.total_distributed, dec!(50));
        assert_eq!(series.current_value, dec!(1100));
        let last = series.flows.last().unwrap();
        assert_eq!((last.date, last.amount), (day(730), dec!(1100)));
    }

    #[test]
    fn test_divested_symbol_keeps_zero_terminal_flow() {
        let data = PortfolioData::new(
            vec![
                txn("A", "X", 0, dec!(-100), "YOU BOUGHT"),
                txn("A", "X", 100, dec!(120), "YOU SOLD"),
            ],
            vec![],
            day(400),
        );
        let config = config_for(&[("A", AccountKind::Brokerage)]);
        let series = CashFlowBuilder::new(&data, &config).symbol("A", "X").unwrap();
        assert_eq!(series.flows.len(), 3);
        assert_eq!(series.flows[2].amount, Decimal::ZERO);
        assert_eq!(series.current_value, Decimal::ZERO);
    }

    #[test]
    fn test_retirement_contribution_is_an_outflow() {
        let data = PortfolioData::new(
            vec![
                txn("K", "FUND", 0, dec!(500), "CONTRIBUTION"),
                txn("K", "FUND", 30, dec!(10), "DIVIDEND"),
            ],
            vec![],
            day(365),
        );
        let retirement = config_for(&[("K", AccountKind::Retirement)]);
        let series = CashFlowBuilder::new(&data, &retirement)
            .symbol("K", "FUND")
            .unwrap();
        assert_eq!(series.flows[0].amount, dec!(-500));
        assert_eq!(series.flows[1].amount, dec!(10));
        assert_eq!(series.total_invested, dec!(500));

        // same rows in a brokerage account keep their ledger sign
        let brokerage = config_for(&[("K", AccountKind::Brokerage)]);
        let series = CashFlowBuilder::new(&data, &brokerage)
            .symbol("K", "FUND")
            .unwrap();
        assert_eq!(series.flows[0].amount, dec!(500));
        assert_eq!(series.total_invested, Decimal::ZERO);
    }

    #[test]
    fn test_account_series_keeps_only_funding_rows_negated() {
        let data = PortfolioData::new(
            vec![
                txn("A", "", 0, dec!(5000), "Electronic Funds Transfer Received"),
                txn("A", "X", 1, dec!(-4000), "YOU BOUGHT X"),
                txn("A", "X", 200, dec!(40), "DIVIDEND RECEIVED X"),
                txn("A", "", 300, dec!(-1000), "WIRE TRANSFER TO BANK"),
            ],
            vec![],
            day(365),
        );
        let config = config_for(&[("A", AccountKind::Brokerage)]);
        let series = CashFlowBuilder::new(&data, &config).account("A").unwrap();
        let amounts: Vec<Money> = series.flows.iter().map(|f| f.amount).collect();
        assert_eq!(amounts, vec![dec!(-5000), dec!(1000), dec!(0)]);
        assert_eq!(series.total_invested, dec!(5000));
        assert_eq!(series.total_distributed, dec!(1000));
    }

    #[test]
    fn test_account_override_replaces_history() {
        let data = PortfolioData::new(
            vec![txn("C", "SPAXX", 10, dec!(3), "DIVIDEND RECEIVED")],
            vec![Position {
                account_number: "C".into(),
                account_name: None,
                symbol: "SPAXX".into(),
                description: String::new(),
                current_value: dec!(104),
                cost_basis: Decimal::ZERO,
                asset_class: AssetClass::Cash,
            }],
            day(365),
        );
        let mut config = config_for(&[("C", AccountKind::Brokerage)]);
        config.funding_overrides.push(FundingOverride {
            account: "C".into(),
            date: day(0),
            amount: dec!(100),
            note: None,
        });
        let series = CashFlowBuilder::new(&data, &config).account("C").unwrap();
        assert_eq!(series.flows.len(), 2);
        assert_eq!(series.flows[0].amount, dec!(-100));
        assert_eq!(series.total_invested, dec!(100));
        assert_eq!(series.current_value, dec!(104));
    }

    #[test]
    fn test_unregistered_account_is_rejected() {
        let data = PortfolioData::new(vec![], vec![], day(1));
        let config = AnalysisConfig::default();
        assert!(CashFlowBuilder::new(&data, &config).account("A").is_err());
    }
}
