use std::str::FromStr;

use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use portfolio_irr_core::performance::{self, XirrInput};
use portfolio_irr_core::time_value::{SolverConfig, SolverMethod};
use portfolio_irr_core::CashFlow;

use crate::input;
use crate::loader;

/// Arguments for a standalone XIRR
#[derive(Args)]
pub struct XirrArgs {
    /// Path to JSON input file ({ "flows": [...], "solver": {...} })
    #[arg(long)]
    pub input: Option<String>,

    /// Dated flows as DATE:AMOUNT pairs (e.g. "2023-01-01:-1000,2024-01-01:1100")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub flows: Option<Vec<String>>,

    /// Root-finding method
    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,

    /// Starting rate for Newton's method
    #[arg(long, allow_hyphen_values = true)]
    pub guess: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Newton,
    Bisection,
    Hybrid,
}

impl From<MethodArg> for SolverMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Newton => SolverMethod::Newton,
            MethodArg::Bisection => SolverMethod::Bisection,
            MethodArg::Hybrid => SolverMethod::Hybrid,
        }
    }
}

pub fn run_xirr(args: XirrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut xirr_input: XirrInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let pairs = args
            .flows
            .as_ref()
            .ok_or("--flows is required (or provide --input)")?;
        XirrInput {
            flows: pairs
                .iter()
                .map(|p| parse_flow(p))
                .collect::<Result<Vec<_>, _>>()?,
            solver: SolverConfig::default(),
        }
    };

    if let Some(method) = args.method {
        xirr_input.solver.method = method.into();
    }
    if let Some(guess) = args.guess {
        xirr_input.solver.initial_guess = guess;
    }

    let result = performance::compute_xirr(&xirr_input)?;
    Ok(serde_json::to_value(result)?)
}

/// `DATE:AMOUNT`, with the same date and currency formats as the CSV loader.
fn parse_flow(pair: &str) -> Result<CashFlow, Box<dyn std::error::Error>> {
    let (date, amount) = pair
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("expected DATE:AMOUNT, got '{pair}'"))?;
    let date = loader::parse_date(date).ok_or_else(|| format!("bad date in '{pair}'"))?;
    let amount = loader::parse_money(amount)
        .or_else(|| Decimal::from_str(amount.trim()).ok())
        .ok_or_else(|| format!("bad amount in '{pair}'"))?;
    Ok(CashFlow::new(date, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_flow_pairs() {
        let flow = parse_flow("2023-01-01:-1000").unwrap();
        assert_eq!(flow.amount, dec!(-1000));
        let flow = parse_flow(" 01/15/2024:$1,100.50 ").unwrap();
        assert_eq!(flow.amount, dec!(1100.50));
        assert!(parse_flow("2023-01-01").is_err());
        assert!(parse_flow("yesterday:5").is_err());
    }
}
