use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NoSolution;
use crate::types::{CashFlow, Money, Rate};

/// Day-count basis for the year fraction of every flow.
pub const DAYS_PER_YEAR: Decimal = dec!(365);

const MAX_BISECTION_ITERATIONS: u32 = 200;

/// Candidate rates scanned (inside the configured bounds) when looking for a bracket.
const BRACKET_GRID: [Decimal; 15] = [
    dec!(-0.99),
    dec!(-0.9),
    dec!(-0.75),
    dec!(-0.5),
    dec!(-0.25),
    dec!(-0.1),
    dec!(0),
    dec!(0.1),
    dec!(0.25),
    dec!(0.5),
    dec!(0.75),
    dec!(1),
    dec!(1.5),
    dec!(2),
    dec!(3),
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Root-finding strategy for XIRR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMethod {
    /// Newton-Raphson from `initial_guess`, bounded by `max_iterations`.
    Newton,
    /// Bisection over a bracket with a verified sign change inside the bounds.
    Bisection,
    /// Newton first; bisection when Newton fails or stops short of a root.
    #[default]
    Hybrid,
}

/// Tuning for the XIRR solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub method: SolverMethod,
    pub initial_guess: Rate,
    pub max_iterations: u32,
    /// Lowest admissible rate (must be > -1)
    pub lower_bound: Rate,
    /// Highest admissible rate
    pub upper_bound: Rate,
    /// Convergence threshold on |NPV|, relative to the gross flow volume
    pub tolerance: Decimal,
    /// Convergence threshold on the rate step / bracket width
    pub rate_tolerance: Decimal,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: SolverMethod::Hybrid,
            initial_guess: dec!(0.10),
            max_iterations: 50,
            lower_bound: dec!(-0.999),
            upper_bound: dec!(5),
            tolerance: dec!(0.000001),
            rate_tolerance: dec!(0.0000000001),
        }
    }
}

/// A converged XIRR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XirrSolution {
    pub rate: Rate,
    pub method: SolverMethod,
    pub iterations: u32,
}

/// Flows reduced to (year fraction from the earliest date, net amount).
///
/// Flows on the same date are netted; NPV is linear in the amounts so this
/// does not change the root, and it keeps aggregate series cheap to solve.
struct Terms {
    terms: Vec<(Decimal, Money)>,
    scale: Money,
}

impl Terms {
    fn from_flows(flows: &[CashFlow]) -> Option<Self> {
        let base = flows.iter().map(|cf| cf.date).min()?;
        let mut by_day: BTreeMap<i64, Money> = BTreeMap::new();
        let mut scale = Decimal::ZERO;
        for cf in flows {
            *by_day.entry((cf.date - base).num_days()).or_default() += cf.amount;
            scale += cf.amount.abs();
        }
        let terms = by_day
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(days, amount)| (Decimal::from(days) / DAYS_PER_YEAR, amount))
            .collect();
        Some(Terms { terms, scale })
    }

    /// NPV and dNPV/dr at `rate`.
    fn evaluate(&self, rate: Rate) -> Result<(Money, Decimal), NoSolution> {
        let one_plus_r = Decimal::ONE + rate;
        if one_plus_r <= Decimal::ZERO {
            return Err(NoSolution::NumericDomain);
        }
        let ln_base = one_plus_r.checked_ln().ok_or(NoSolution::NumericDomain)?;

        let mut npv = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;
        for (years, amount) in &self.terms {
            let discount = if years.is_zero() {
                Decimal::ONE
            } else {
                (-(ln_base * years))
                    .checked_exp()
                    .ok_or(NoSolution::NumericDomain)?
            };
            let pv = amount
                .checked_mul(discount)
                .ok_or(NoSolution::NumericDomain)?;
            npv = npv.checked_add(pv).ok_or(NoSolution::NumericDomain)?;
            let slope = years
                .checked_mul(pv)
                .and_then(|v| v.checked_div(one_plus_r))
                .ok_or(NoSolution::NumericDomain)?;
            dnpv = dnpv.checked_sub(slope).ok_or(NoSolution::NumericDomain)?;
        }
        Ok((npv, dnpv))
    }

    fn npv(&self, rate: Rate) -> Result<Money, NoSolution> {
        self.evaluate(rate).map(|(npv, _)| npv)
    }

    fn npv_tolerance(&self, config: &SolverConfig) -> Decimal {
        config.tolerance * self.scale.max(Decimal::ONE)
    }

    /// Whether `rate` zeroes the NPV to within tolerance. The bounds only
    /// limit the bisection search, so a verified root outside them counts.
    fn is_root(&self, rate: Rate, config: &SolverConfig) -> bool {
        self.npv(rate)
            .map(|v| v.abs() <= self.npv_tolerance(config))
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Net present value of dated flows at an annual `rate`, discounting each flow
/// by (1 + rate)^(days since the earliest flow / 365).
pub fn xnpv(rate: Rate, flows: &[CashFlow]) -> Result<Money, NoSolution> {
    match Terms::from_flows(flows) {
        Some(terms) => terms.npv(rate),
        None => Ok(Decimal::ZERO),
    }
}

/// Reject series for which no root can exist before spending iterations.
fn check_solvable(flows: &[CashFlow]) -> Result<Terms, NoSolution> {
    if flows.len() < 2 {
        return Err(NoSolution::InsufficientFlows);
    }
    let has_inflow = flows.iter().any(|cf| cf.amount > Decimal::ZERO);
    let has_outflow = flows.iter().any(|cf| cf.amount < Decimal::ZERO);
    if !(has_inflow && has_outflow) {
        return Err(NoSolution::UniformSign);
    }
    let terms = Terms::from_flows(flows).ok_or(NoSolution::InsufficientFlows)?;
    // Netting same-day flows can leave a single term or a uniform sign.
    if terms.terms.len() < 2 {
        return Err(NoSolution::UniformSign);
    }
    let term_inflow = terms.terms.iter().any(|(_, a)| *a > Decimal::ZERO);
    let term_outflow = terms.terms.iter().any(|(_, a)| *a < Decimal::ZERO);
    if !(term_inflow && term_outflow) {
        return Err(NoSolution::UniformSign);
    }
    Ok(terms)
}

/// Annualised internal rate of return for irregular dated flows.
///
/// Flows need not be sorted and may share dates.
pub fn xirr(flows: &[CashFlow], config: &SolverConfig) -> Result<XirrSolution, NoSolution> {
    let terms = check_solvable(flows)?;
    let outcome = match config.method {
        SolverMethod::Newton => newton(&terms, config),
        SolverMethod::Bisection => bisection(&terms, config),
        SolverMethod::Hybrid => match newton(&terms, config) {
            Ok(sol) if terms.is_root(sol.rate, config) => Ok(sol),
            Ok(sol) => {
                debug!(rate = %sol.rate, "newton stopped off the root, falling back to bisection");
                bisection(&terms, config)
            }
            Err(reason) => {
                debug!(%reason, "newton failed, falling back to bisection");
                bisection(&terms, config)
            }
        },
    };
    match &outcome {
        Ok(sol) => debug!(rate = %sol.rate, method = ?sol.method, iterations = sol.iterations, "xirr solved"),
        Err(reason) => debug!(%reason, flows = flows.len(), "xirr has no solution"),
    }
    outcome
}

/// XIRR by Newton-Raphson only.
pub fn xirr_newton(flows: &[CashFlow], config: &SolverConfig) -> Result<XirrSolution, NoSolution> {
    let terms = check_solvable(flows)?;
    newton(&terms, config)
}

/// XIRR by bracketed bisection only.
pub fn xirr_bisection(
    flows: &[CashFlow],
    config: &SolverConfig,
) -> Result<XirrSolution, NoSolution> {
    let terms = check_solvable(flows)?;
    bisection(&terms, config)
}

// ---------------------------------------------------------------------------
// Root finders
// ---------------------------------------------------------------------------

fn newton(terms: &Terms, config: &SolverConfig) -> Result<XirrSolution, NoSolution> {
    let tolerance = terms.npv_tolerance(config);
    let mut rate = config.initial_guess;

    for i in 0..config.max_iterations {
        let (npv_val, dnpv) = terms.evaluate(rate)?;

        if npv_val.abs() <= tolerance {
            return Ok(XirrSolution {
                rate,
                method: SolverMethod::Newton,
                iterations: i,
            });
        }

        if dnpv.is_zero() {
            return Err(NoSolution::NonConvergence { iterations: i });
        }

        let step = npv_val.checked_div(dnpv).ok_or(NoSolution::NumericDomain)?;
        rate = rate.checked_sub(step).ok_or(NoSolution::NumericDomain)?;

        if step.abs() <= config.rate_tolerance {
            terms.evaluate(rate)?;
            return Ok(XirrSolution {
                rate,
                method: SolverMethod::Newton,
                iterations: i + 1,
            });
        }
    }

    Err(NoSolution::NonConvergence {
        iterations: config.max_iterations,
    })
}

/// Find adjacent grid rates with a verified NPV sign change.
fn find_bracket(terms: &Terms, config: &SolverConfig) -> Result<(Rate, Money, Rate, Money), NoSolution> {
    let mut grid: Vec<Rate> = BRACKET_GRID
        .iter()
        .copied()
        .filter(|r| *r > config.lower_bound && *r < config.upper_bound)
        .collect();
    grid.insert(0, config.lower_bound);
    grid.push(config.upper_bound);

    let mut previous: Option<(Rate, Money)> = None;
    for rate in grid {
        let value = match terms.npv(rate) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if value.is_zero() {
            return Ok((rate, value, rate, value));
        }
        if let Some((prev_rate, prev_value)) = previous {
            if prev_value.is_sign_negative() != value.is_sign_negative() {
                return Ok((prev_rate, prev_value, rate, value));
            }
        }
        previous = Some((rate, value));
    }

    Err(NoSolution::NoBracket {
        lower: config.lower_bound,
        upper: config.upper_bound,
    })
}

fn bisection(terms: &Terms, config: &SolverConfig) -> Result<XirrSolution, NoSolution> {
    if config.lower_bound <= dec!(-1) || config.lower_bound >= config.upper_bound {
        return Err(NoSolution::NumericDomain);
    }
    let tolerance = terms.npv_tolerance(config);
    let (mut lo, mut lo_val, mut hi, hi_val) = find_bracket(terms, config)?;

    if hi_val.is_zero() {
        return Ok(XirrSolution {
            rate: hi,
            method: SolverMethod::Bisection,
            iterations: 0,
        });
    }

    for i in 0..MAX_BISECTION_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let mid_val = terms.npv(mid)?;

        if mid_val.abs() <= tolerance || (hi - lo) <= config.rate_tolerance {
            return Ok(XirrSolution {
                rate: mid,
                method: SolverMethod::Bisection,
                iterations: i + 1,
            });
        }

        if mid_val.is_sign_negative() == lo_val.is_sign_negative() {
            lo = mid;
            lo_val = mid_val;
        } else {
            hi = mid;
        }
    }

    Err(NoSolution::NonConvergence {
        iterations: MAX_BISECTION_ITERATIONS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_xnpv_zero_rate_is_sum() {
        let flows = vec![
            CashFlow::new(d(2020, 1, 1), dec!(-100)),
            CashFlow::new(d(2020, 6, 1), dec!(30)),
            CashFlow::new(d(2021, 1, 1), dec!(90)),
        ];
        assert_eq!(xnpv(Decimal::ZERO, &flows).unwrap(), dec!(20));
    }

    #[test]
    fn test_xirr_one_year_ten_percent() {
        let flows = vec![
            CashFlow::new(d(2023, 1, 1), dec!(-1000)),
            CashFlow::new(d(2024, 1, 1), dec!(1100)),
        ];
        let sol = xirr(&flows, &SolverConfig::default()).unwrap();
        assert!((sol.rate - dec!(0.10)).abs() < dec!(0.0001), "got {}", sol.rate);
    }

    #[test]
    fn test_single_flow_has_no_solution() {
        let flows = vec![CashFlow::new(d(2023, 1, 1), dec!(-1000))];
        assert_eq!(
            xirr(&flows, &SolverConfig::default()),
            Err(NoSolution::InsufficientFlows)
        );
    }

    #[test]
    fn test_uniform_sign_short_circuits() {
        let flows = vec![
            CashFlow::new(d(2023, 1, 1), dec!(100)),
            CashFlow::new(d(2024, 1, 1), dec!(0)),
        ];
        assert_eq!(
            xirr(&flows, &SolverConfig::default()),
            Err(NoSolution::UniformSign)
        );
    }

    #[test]
    fn test_same_day_flows_netting_to_one_sign() {
        // -100 and +100 on the same day net to nothing; only the later inflow remains
        let flows = vec![
            CashFlow::new(d(2023, 1, 1), dec!(-100)),
            CashFlow::new(d(2023, 1, 1), dec!(100)),
            CashFlow::new(d(2024, 1, 1), dec!(50)),
        ];
        assert_eq!(
            xirr(&flows, &SolverConfig::default()),
            Err(NoSolution::UniformSign)
        );
    }

    #[test]
    fn test_domain_guard_below_minus_one() {
        let flows = vec![
            CashFlow::new(d(2023, 1, 1), dec!(-100)),
            CashFlow::new(d(2024, 1, 1), dec!(50)),
        ];
        assert_eq!(xnpv(dec!(-1.5), &flows), Err(NoSolution::NumericDomain));
    }

    #[test]
    fn test_bisection_matches_newton() {
        let flows = vec![
            CashFlow::new(d(2020, 1, 1), dec!(-1000)),
            CashFlow::new(d(2021, 1, 1), dec!(50)),
            CashFlow::new(d(2021, 12, 31), dec!(1100)),
        ];
        let config = SolverConfig::default();
        let newton = xirr_newton(&flows, &config).unwrap();
        let bisect = xirr_bisection(&flows, &config).unwrap();
        assert_eq!(newton.method, SolverMethod::Newton);
        assert_eq!(bisect.method, SolverMethod::Bisection);
        assert!(
            (newton.rate - bisect.rate).abs() < dec!(0.0001),
            "newton {} vs bisection {}",
            newton.rate,
            bisect.rate
        );
    }

    #[test]
    fn test_bisection_rejects_inverted_bounds() {
        let flows = vec![
            CashFlow::new(d(2023, 1, 1), dec!(-1000)),
            CashFlow::new(d(2024, 1, 1), dec!(1100)),
        ];
        let config = SolverConfig {
            lower_bound: dec!(1),
            upper_bound: dec!(0.5),
            ..SolverConfig::default()
        };
        assert!(xirr_bisection(&flows, &config).is_err());
    }

    #[test]
    fn test_hybrid_keeps_newton_root_above_upper_bound() {
        // a 6% gain over ten days annualises to roughly 739%
        let flows = vec![
            CashFlow::new(d(2024, 1, 1), dec!(-1000)),
            CashFlow::new(d(2024, 1, 11), dec!(1060)),
        ];
        let config = SolverConfig::default();
        assert!(xirr_bisection(&flows, &config).is_err());

        let sol = xirr(&flows, &config).unwrap();
        assert_eq!(sol.method, SolverMethod::Newton);
        assert!(sol.rate > config.upper_bound);
        assert!((sol.rate - dec!(7.388)).abs() < dec!(0.001), "got {}", sol.rate);
        assert!(xnpv(sol.rate, &flows).unwrap().abs() < dec!(0.01));
    }
}
