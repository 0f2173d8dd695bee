use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cash_flows::{CashFlowBuilder, Entity};
use crate::config::AnalysisConfig;
use crate::data::PortfolioData;
use crate::performance::metrics::{calculate_metrics, EntityMetrics};
use crate::types::*;
use crate::PortfolioResult;

const METHODOLOGY: &str =
    "Money-weighted return (XIRR, actual/365) per entity, with ROI, capital-weighted holding period and allocation";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One row of a batch analysis.
///
/// A row whose series could not be built carries `error` and leaves every
/// derived metric undefined; the rest of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub entity: Entity,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_label: Option<String>,
    pub current_value: Money,
    pub total_invested: Money,
    pub total_distributed: Money,
    pub cost_basis: Money,
    pub dollar_return: Option<Money>,
    pub roi: Option<Rate>,
    pub irr: Option<Rate>,
    pub holding_period_years: Option<Years>,
    /// Share of the batch's total current value.
    pub allocation: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetricsRecord {
    fn from_metrics(metrics: EntityMetrics, account_label: Option<String>) -> Self {
        MetricsRecord {
            name: metrics.entity.name(),
            entity: metrics.entity,
            account_label,
            current_value: metrics.current_value,
            total_invested: metrics.total_invested,
            total_distributed: metrics.total_distributed,
            cost_basis: metrics.cost_basis,
            dollar_return: Some(metrics.dollar_return),
            roi: Some(metrics.roi),
            irr: metrics.irr,
            holding_period_years: metrics.holding_period_years,
            allocation: None,
            error: None,
        }
    }

    fn failed(entity: Entity, account_label: Option<String>, error: String) -> Self {
        MetricsRecord {
            name: entity.name(),
            entity,
            account_label,
            current_value: Decimal::ZERO,
            total_invested: Decimal::ZERO,
            total_distributed: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            dollar_return: None,
            roi: None,
            irr: None,
            holding_period_years: None,
            allocation: None,
            error: Some(error),
        }
    }
}

/// Rows of one batch plus its totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsTable {
    pub records: Vec<MetricsRecord>,
    pub total_current_value: Money,
    pub total_invested: Money,
    pub failed: usize,
}

/// Asset class and holding breakdown of one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBreakdown {
    pub account: String,
    pub label: String,
    pub asset_classes: MetricsTable,
    pub holdings: MetricsTable,
}

/// Everything: portfolio total, accounts, portfolio-wide asset classes and
/// per-account breakdowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub valuation_date: NaiveDate,
    pub portfolio: MetricsRecord,
    pub accounts: MetricsTable,
    pub asset_classes: MetricsTable,
    pub breakdowns: Vec<AccountBreakdown>,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Runs batch analyses over one validated data set.
pub struct PortfolioAnalyzer<'a> {
    builder: CashFlowBuilder<'a>,
}

impl<'a> PortfolioAnalyzer<'a> {
    /// Validates the tables and the configuration against them. Failures here
    /// are the only batch-fatal errors.
    pub fn new(data: &'a PortfolioData, config: &'a AnalysisConfig) -> PortfolioResult<Self> {
        data.validate()?;
        config.validate(data)?;
        Ok(PortfolioAnalyzer {
            builder: CashFlowBuilder::new(data, config),
        })
    }

    pub fn builder(&self) -> CashFlowBuilder<'a> {
        self.builder
    }

    fn data(&self) -> &'a PortfolioData {
        self.builder.data()
    }

    fn config(&self) -> &'a AnalysisConfig {
        self.builder.config()
    }

    /// Metrics for a single entity. Build errors propagate.
    pub fn analyze_entity(
        &self,
        entity: &Entity,
    ) -> PortfolioResult<ComputationOutput<EntityMetrics>> {
        let start = Instant::now();
        let series = self.builder.build(entity)?;
        let mut metrics = calculate_metrics(&series, &self.config().solver);
        let warnings = std::mem::take(&mut metrics.warnings);
        Ok(with_metadata(
            METHODOLOGY,
            &self.assumptions(),
            warnings,
            start.elapsed().as_micros() as u64,
            metrics,
        ))
    }

    /// Every symbol traded or held in `account`, by current value descending.
    pub fn analyze_holdings(&self, account: &str) -> PortfolioResult<ComputationOutput<MetricsTable>> {
        let start = Instant::now();
        let (table, warnings) = self.holdings_table(account)?;
        Ok(self.wrap(table, warnings, start))
    }

    /// Stock, Bond and Cash rows for `account`.
    pub fn analyze_asset_classes(
        &self,
        account: &str,
    ) -> PortfolioResult<ComputationOutput<MetricsTable>> {
        let start = Instant::now();
        let (table, warnings) = self.asset_class_table(account)?;
        Ok(self.wrap(table, warnings, start))
    }

    /// Stock, Bond and Cash rows across every account; allocation is against
    /// the whole portfolio's value.
    pub fn analyze_portfolio_asset_classes(&self) -> PortfolioResult<ComputationOutput<MetricsTable>> {
        let start = Instant::now();
        let (table, warnings) = self.portfolio_asset_class_table();
        Ok(self.wrap(table, warnings, start))
    }

    /// Whole-account rows by total invested descending.
    pub fn analyze_accounts(&self) -> PortfolioResult<ComputationOutput<MetricsTable>> {
        let start = Instant::now();
        let (table, warnings) = self.accounts_table();
        Ok(self.wrap(table, warnings, start))
    }

    /// The aggregate of every account series.
    pub fn analyze_portfolio(&self) -> PortfolioResult<ComputationOutput<MetricsRecord>> {
        let start = Instant::now();
        let mut warnings = Vec::new();
        let record = self.evaluate(&Entity::Portfolio, &mut warnings);
        Ok(self.wrap(record, warnings, start))
    }

    /// Portfolio, accounts and every account's breakdown in one report.
    pub fn analyze_all(&self) -> PortfolioResult<ComputationOutput<PortfolioReport>> {
        let start = Instant::now();
        let mut warnings = Vec::new();

        let mut portfolio = self.evaluate(&Entity::Portfolio, &mut warnings);
        if portfolio.error.is_none() {
            portfolio.allocation = Some(Decimal::ONE);
        }
        let (accounts, w) = self.accounts_table();
        warnings.extend(w);
        let (class_totals, w) = self.portfolio_asset_class_table();
        warnings.extend(w);

        let mut breakdowns = Vec::with_capacity(accounts.records.len());
        for record in accounts.records.iter().filter(|r| r.error.is_none()) {
            let Some(account) = record.entity.account_number() else {
                continue;
            };
            let (asset_classes, w) = self.asset_class_table(account)?;
            warnings.extend(w);
            let (holdings, w) = self.holdings_table(account)?;
            warnings.extend(w);
            breakdowns.push(AccountBreakdown {
                account: account.to_string(),
                label: self.label(account),
                asset_classes,
                holdings,
            });
        }

        let report = PortfolioReport {
            valuation_date: self.data().valuation_date,
            portfolio,
            accounts,
            asset_classes: class_totals,
            breakdowns,
        };
        Ok(self.wrap(report, warnings, start))
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    fn holdings_table(&self, account: &str) -> PortfolioResult<(MetricsTable, Vec<String>)> {
        self.config().account(account)?;
        let entities: Vec<Entity> = self
            .data()
            .symbols_in_account(account)
            .into_iter()
            .filter(|s| !self.config().is_ignored_symbol(s))
            .map(|s| Entity::symbol(account, s))
            .collect();
        let (mut records, warnings) = self.evaluate_batch(&entities);
        records.sort_by(|a, b| b.current_value.cmp(&a.current_value));
        Ok((table(records), warnings))
    }

    fn asset_class_table(&self, account: &str) -> PortfolioResult<(MetricsTable, Vec<String>)> {
        self.config().account(account)?;
        let entities: Vec<Entity> = AssetClass::ALL
            .iter()
            .map(|class| Entity::asset_class(account, *class))
            .collect();
        let (records, warnings) = self.evaluate_batch(&entities);
        Ok((table(records), warnings))
    }

    fn portfolio_asset_class_table(&self) -> (MetricsTable, Vec<String>) {
        let entities: Vec<Entity> = AssetClass::ALL
            .iter()
            .map(|class| Entity::portfolio_asset_class(*class))
            .collect();
        let (records, warnings) = self.evaluate_batch(&entities);
        (table(records), warnings)
    }

    fn accounts_table(&self) -> (MetricsTable, Vec<String>) {
        let entities: Vec<Entity> = self
            .data()
            .accounts()
            .into_iter()
            .map(Entity::account)
            .collect();
        let (mut records, warnings) = self.evaluate_batch(&entities);
        records.sort_by(|a, b| match b.total_invested.cmp(&a.total_invested) {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        });
        (table(records), warnings)
    }

    /// Independent entities evaluated as a parallel map; input order is kept.
    fn evaluate_batch(&self, entities: &[Entity]) -> (Vec<MetricsRecord>, Vec<String>) {
        #[cfg(feature = "parallel")]
        let results: Vec<(MetricsRecord, Vec<String>)> = entities
            .par_iter()
            .map(|e| {
                let mut w = Vec::new();
                (self.evaluate(e, &mut w), w)
            })
            .collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<(MetricsRecord, Vec<String>)> = entities
            .iter()
            .map(|e| {
                let mut w = Vec::new();
                (self.evaluate(e, &mut w), w)
            })
            .collect();

        let mut warnings = Vec::new();
        let mut records = Vec::with_capacity(results.len());
        for (record, w) in results {
            records.push(record);
            warnings.extend(w);
        }
        assign_allocation(&mut records);
        debug!(entities = entities.len(), "evaluated batch");
        (records, warnings)
    }

    /// Build and measure one entity, isolating any failure into the record.
    fn evaluate(&self, entity: &Entity, warnings: &mut Vec<String>) -> MetricsRecord {
        let label = entity.account_number().map(|a| self.label(a));
        match self.builder.build(entity) {
            Ok(series) => {
                let mut metrics = calculate_metrics(&series, &self.config().solver);
                warnings.append(&mut metrics.warnings);
                MetricsRecord::from_metrics(metrics, label)
            }
            Err(e) => {
                warn!(entity = %entity, error = %e, "entity analysis failed, continuing batch");
                warnings.push(format!("{entity}: {e}"));
                MetricsRecord::failed(entity.clone(), label, e.to_string())
            }
        }
    }

    fn label(&self, account: &str) -> String {
        self.config()
            .account_label(account)
            .or_else(|| self.data().account_name(account))
            .unwrap_or(account)
            .to_string()
    }

    fn assumptions(&self) -> serde_json::Value {
        serde_json::json!({
            "valuation_date": self.data().valuation_date,
            "day_count": "actual/365",
            "dollar_return": "current value + distributions - invested",
            "account_flows": "external funding only",
            "solver": self.config().solver,
        })
    }

    fn wrap<T: Serialize>(
        &self,
        result: T,
        warnings: Vec<String>,
        start: Instant,
    ) -> ComputationOutput<T> {
        with_metadata(
            METHODOLOGY,
            &self.assumptions(),
            warnings,
            start.elapsed().as_micros() as u64,
            result,
        )
    }
}

/// Allocation = current value / batch total; undefined when the total is 0.
fn assign_allocation(records: &mut [MetricsRecord]) {
    let total: Money = records.iter().map(|r| r.current_value).sum();
    for r in records.iter_mut() {
        r.allocation = if total.is_zero() {
            None
        } else {
            Some(r.current_value / total)
        };
    }
}

fn table(records: Vec<MetricsRecord>) -> MetricsTable {
    MetricsTable {
        total_current_value: records.iter().map(|r| r.current_value).sum(),
        total_invested: records.iter().map(|r| r.total_invested).sum(),
        failed: records.iter().filter(|r| r.error.is_some()).count(),
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountKind, AccountProfile};
    use crate::data::{Position, Transaction};
    use rust_decimal_macros::dec;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, m, day).unwrap()
    }

    fn txn(account: &str, symbol: &str, date: NaiveDate, amount: Money, action: &str) -> Transaction {
        Transaction {
            run_date: date,
            account_number: account.into(),
            symbol: symbol.into(),
            description: String::new(),
            amount,
            action: action.into(),
            asset_class: AssetClass::Stock,
        }
    }

    fn pos(account: &str, symbol: &str, value: Money, class: AssetClass) -> Position {
        Position {
            account_number: account.into(),
            account_name: None,
            symbol: symbol.into(),
            description: String::new(),
            current_value: value,
            cost_basis: Decimal::ZERO,
            asset_class: class,
        }
    }

    fn fixture() -> (PortfolioData, AnalysisConfig) {
        let data = PortfolioData::new(
            vec![
                txn("A", "", d(1, 3), dec!(1000), "ELECTRONIC FUNDS TRANSFER RECEIVED"),
                txn("A", "X", d(1, 4), dec!(-600), "YOU BOUGHT"),
                txn("A", "Y", d(1, 4), dec!(-300), "YOU BOUGHT"),
            ],
            vec![
                pos("A", "X", dec!(700), AssetClass::Stock),
                pos("A", "Y", dec!(200), AssetClass::Stock),
                pos("A", "SPAXX", dec!(100), AssetClass::Cash),
            ],
            d(12, 29),
        );
        let config = AnalysisConfig {
            accounts: vec![AccountProfile {
                number: "A".into(),
                label: "Brokerage".into(),
                kind: AccountKind::Brokerage,
            }],
            ..AnalysisConfig::default()
        };
        (data, config)
    }

    #[test]
    fn test_holdings_sorted_with_allocation() {
        let (data, config) = fixture();
        let analyzer = PortfolioAnalyzer::new(&data, &config).unwrap();
        let out = analyzer.analyze_holdings("A").unwrap();
        let names: Vec<&str> = out.result.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["X", "Y", "SPAXX"]);
        assert_eq!(out.result.records[0].allocation, Some(dec!(0.7)));
        assert_eq!(out.result.total_current_value, dec!(1000));
        assert_eq!(out.result.records[0].account_label.as_deref(), Some("Brokerage"));
    }

    #[test]
    fn test_asset_classes_cover_all_classes() {
        let (data, config) = fixture();
        let analyzer = PortfolioAnalyzer::new(&data, &config).unwrap();
        let out = analyzer.analyze_asset_classes("A").unwrap();
        let names: Vec<&str> = out.result.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Stock", "Bond", "Cash"]);
        assert_eq!(out.result.records[1].current_value, Decimal::ZERO);
        assert_eq!(out.result.records[1].irr, None);
    }

    #[test]
    fn test_portfolio_asset_classes_span_accounts() {
        let (mut data, mut config) = fixture();
        data.positions
            .push(pos("B", "BND", dec!(1000), AssetClass::Bond));
        config.accounts.push(AccountProfile {
            number: "B".into(),
            label: "Joint".into(),
            kind: AccountKind::Brokerage,
        });
        let analyzer = PortfolioAnalyzer::new(&data, &config).unwrap();
        let out = analyzer.analyze_portfolio_asset_classes().unwrap();
        let records = &out.result.records;
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Stock", "Bond", "Cash"]);
        assert_eq!(out.result.total_current_value, dec!(2000));
        assert_eq!(records[0].current_value, dec!(900));
        assert_eq!(records[1].allocation, Some(dec!(0.5)));
        assert_eq!(records[0].account_label, None);
    }

    #[test]
    fn test_unregistered_account_batch_is_rejected() {
        let (data, config) = fixture();
        let analyzer = PortfolioAnalyzer::new(&data, &config).unwrap();
        assert!(analyzer.analyze_holdings("Q").is_err());
    }

    #[test]
    fn test_failure_is_isolated_to_its_record() {
        let (mut data, config) = fixture();
        // an account present in the data but missing from the registry
        data.positions
            .push(pos("B", "Z", dec!(50), AssetClass::Stock));
        let analyzer = PortfolioAnalyzer::new(&data, &config).unwrap();
        let out = analyzer.analyze_accounts().unwrap();
        assert_eq!(out.result.records.len(), 2);
        assert_eq!(out.result.failed, 1);
        let bad = out.result.records.iter().find(|r| r.name == "B").unwrap();
        assert!(bad.error.is_some());
        assert_eq!(bad.irr, None);
        let good = out.result.records.iter().find(|r| r.name == "A").unwrap();
        assert!(good.error.is_none());
        assert!(good.irr.is_some());
    }
}
