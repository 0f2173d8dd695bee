use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::cash_flows::{Entity, EntitySeries};
use crate::error::PortfolioError;
use crate::time_value::{self, SolverConfig, SolverMethod, XirrSolution, DAYS_PER_YEAR};
use crate::types::*;
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metrics for one entity cash-flow series.
///
/// `irr` and `holding_period_years` are `None` when undefined; a computed
/// zero is a real 0% / 0 years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetrics {
    pub entity: Entity,
    pub current_value: Money,
    pub total_invested: Money,
    pub total_distributed: Money,
    pub cost_basis: Money,
    /// current value + distributions - invested
    pub dollar_return: Money,
    /// dollar return / invested; 0 when nothing was invested
    pub roi: Rate,
    pub irr: Option<Rate>,
    pub holding_period_years: Option<Years>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver: Option<XirrSolution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A bare list of dated flows to solve, outside any entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XirrInput {
    pub flows: Vec<CashFlow>,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XirrOutput {
    pub irr: Option<Rate>,
    pub method: Option<SolverMethod>,
    pub iterations: Option<u32>,
    /// NPV at the returned rate, for checking the root.
    pub npv_at_irr: Option<Money>,
    pub flow_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_solution: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute every metric for a series. Never fails: undefined metrics are
/// reported as `None` with a warning.
pub fn calculate_metrics(series: &EntitySeries, solver: &SolverConfig) -> EntityMetrics {
    let mut warnings = Vec::new();

    let dollar_return = series.current_value + series.total_distributed - series.total_invested;
    let roi = if series.total_invested.is_zero() {
        warnings.push(format!(
            "{}: nothing invested, ROI reported as 0",
            series.entity
        ));
        Decimal::ZERO
    } else {
        dollar_return / series.total_invested
    };

    let (irr, solution) = match time_value::xirr(&series.flows, solver) {
        Ok(sol) => (Some(sol.rate), Some(sol)),
        Err(reason) => {
            warnings.push(format!("{}: IRR undefined ({reason})", series.entity));
            (None, None)
        }
    };

    let holding_period_years = holding_period_years(series);
    if holding_period_years.is_none() {
        warnings.push(format!(
            "{}: no contributions, holding period undefined",
            series.entity
        ));
    }

    debug!(
        entity = %series.entity,
        irr = ?irr,
        roi = %roi,
        "computed entity metrics"
    );

    EntityMetrics {
        entity: series.entity.clone(),
        current_value: series.current_value,
        total_invested: series.total_invested,
        total_distributed: series.total_distributed,
        cost_basis: series.cost_basis,
        dollar_return,
        roi,
        irr,
        holding_period_years,
        solver: solution,
        warnings,
    }
}

/// Capital-weighted average time contributions have been held, in years.
///
/// Only negative historical flows count, each weighted by its size and aged
/// to the valuation date. `None` when there are no contributions.
pub fn holding_period_years(series: &EntitySeries) -> Option<Years> {
    let (weighted_days, weight) = series.contributions().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(weighted_days, weight), cf| {
            let days = Decimal::from((series.valuation_date - cf.date).num_days());
            let w = cf.amount.abs();
            (weighted_days + days * w, weight + w)
        },
    );
    if weight.is_zero() {
        return None;
    }
    Some(weighted_days / weight / DAYS_PER_YEAR)
}

/// [`calculate_metrics`] wrapped in the standard output envelope.
pub fn entity_metrics(
    series: &EntitySeries,
    solver: &SolverConfig,
) -> PortfolioResult<ComputationOutput<EntityMetrics>> {
    let start = Instant::now();
    let mut metrics = calculate_metrics(series, solver);
    let warnings = std::mem::take(&mut metrics.warnings);
    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Money-weighted return (XIRR, actual/365) with ROI and capital-weighted holding period",
        &serde_json::json!({
            "day_count": "actual/365",
            "dollar_return": "current value + distributions - invested",
            "solver": solver,
        }),
        warnings,
        elapsed,
        metrics,
    ))
}

/// Solve XIRR for an arbitrary flow list. An empty list is rejected; any
/// other unsolvable list yields `irr: None` and the reason.
pub fn compute_xirr(input: &XirrInput) -> PortfolioResult<ComputationOutput<XirrOutput>> {
    let start = Instant::now();
    if input.flows.is_empty() {
        return Err(PortfolioError::InsufficientData(
            "at least one cash flow is required".into(),
        ));
    }

    let mut warnings = Vec::new();
    let output = match time_value::xirr(&input.flows, &input.solver) {
        Ok(sol) => XirrOutput {
            irr: Some(sol.rate),
            method: Some(sol.method),
            iterations: Some(sol.iterations),
            npv_at_irr: time_value::xnpv(sol.rate, &input.flows).ok(),
            flow_count: input.flows.len(),
            no_solution: None,
        },
        Err(reason) => {
            warnings.push(format!("IRR undefined ({reason})"));
            XirrOutput {
                irr: None,
                method: None,
                iterations: None,
                npv_at_irr: None,
                flow_count: input.flows.len(),
                no_solution: Some(reason.to_string()),
            }
        }
    };

    Ok(with_metadata(
        "XIRR: rate zeroing sum of amount / (1 + r)^(days / 365) from the earliest flow",
        &input.solver,
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal_macros::dec;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, 1).unwrap() + Duration::days(n)
    }

    fn series(history: &[(i64, Money)], value: Money, valuation: i64) -> EntitySeries {
        EntitySeries::from_history(
            Entity::symbol("A", "X"),
            history
                .iter()
                .map(|(n, amount)| CashFlow::new(day(*n), *amount))
                .collect(),
            value,
            Decimal::ZERO,
            day(valuation),
        )
    }

    #[test]
    fn test_lump_sum_two_years_holding_period() {
        let s = series(&[(0, dec!(-1000))], dec!(1210), 730);
        assert_eq!(holding_period_years(&s), Some(dec!(2)));
    }

    #[test]
    fn test_holding_period_is_capital_weighted() {
        // 300 held 365 days, 100 held 0 days
        let s = series(&[(0, dec!(-300)), (365, dec!(-100))], dec!(400), 365);
        let hp = holding_period_years(&s).unwrap();
        assert_eq!(hp, dec!(0.75));
    }

    #[test]
    fn test_no_contributions_leaves_holding_period_undefined() {
        let s = series(&[(0, dec!(25))], dec!(0), 10);
        assert_eq!(holding_period_years(&s), None);
        let m = calculate_metrics(&s, &SolverConfig::default());
        assert_eq!(m.roi, Decimal::ZERO);
        assert!(m.irr.is_none());
        assert!(m.warnings.iter().any(|w| w.contains("holding period")));
    }

    #[test]
    fn test_roi_and_dollar_return_include_distributions() {
        let s = series(&[(0, dec!(-1000)), (365, dec!(50))], dec!(1100), 730);
        let m = calculate_metrics(&s, &SolverConfig::default());
        assert_eq!(m.dollar_return, dec!(150));
        assert_eq!(m.roi, dec!(0.15));
        assert!(m.irr.is_some());
        assert!(m.warnings.is_empty());
    }

    #[test]
    fn test_single_flow_irr_is_undefined_not_zero() {
        // buy on the valuation date itself: one netted term
        let s = series(&[(10, dec!(-100))], dec!(100), 10);
        let m = calculate_metrics(&s, &SolverConfig::default());
        assert_eq!(m.irr, None);
        assert!(m.warnings.iter().any(|w| w.contains("IRR undefined")));
    }

    #[test]
    fn test_compute_xirr_reports_reason_for_single_flow() {
        let input = XirrInput {
            flows: vec![CashFlow::new(day(0), dec!(-10))],
            solver: SolverConfig::default(),
        };
        let out = compute_xirr(&input).unwrap();
        assert_eq!(out.result.irr, None);
        assert!(out.result.no_solution.is_some());

        let empty = XirrInput {
            flows: vec![],
            solver: SolverConfig::default(),
        };
        assert!(matches!(
            compute_xirr(&empty),
            Err(PortfolioError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_envelope_moves_warnings_out_of_result() {
        let s = series(&[], dec!(0), 10);
        let out = entity_metrics(&s, &SolverConfig::default()).unwrap();
        assert!(out.result.warnings.is_empty());
        assert!(!out.warnings.is_empty());
    }
}
