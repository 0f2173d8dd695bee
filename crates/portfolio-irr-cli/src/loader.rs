//! Brokerage CSV exports -> normalised [`PortfolioData`].
//!
//! Positions come from the newest `Portfolio_Positions_<Mon-DD-YYYY>.csv`
//! (its filename date is the valuation date); history is every
//! `Accounts_History_*.csv` in the directory, concatenated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use portfolio_irr_core::classification::ClassificationRules;
use portfolio_irr_core::data::{PortfolioData, Position, Transaction};
use portfolio_irr_core::PortfolioError;

use crate::settings::Settings;

const POSITIONS_PREFIX: &str = "Portfolio_Positions_";
const HISTORY_PREFIX: &str = "Accounts_History_";
const FILENAME_DATE: &str = "%b-%d-%Y";
const ROW_DATE_FORMATS: [&str; 3] = ["%m/%d/%Y", "%Y-%m-%d", "%m/%d/%y"];

type LoadResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load and normalise both tables from `dir`.
pub fn load_portfolio(dir: &Path, settings: &Settings) -> LoadResult<PortfolioData> {
    let (positions_file, valuation_date) = latest_positions_file(dir)?;
    info!(file = %positions_file.display(), %valuation_date, "loading positions");
    let positions = read_positions(&positions_file, &settings.analysis.classification)?;

    let history = history_files(dir)?;
    info!(files = history.len(), "loading transaction history");
    let mut transactions = Vec::new();
    for file in &history {
        transactions.extend(read_transactions(file, settings)?);
    }

    let before = transactions.len();
    transactions.retain(|t| t.run_date <= valuation_date);
    if transactions.len() < before {
        warn!(
            dropped = before - transactions.len(),
            %valuation_date,
            "dropped history rows dated after the positions snapshot"
        );
    }
    transactions.sort_by_key(|t| t.run_date);

    Ok(PortfolioData::new(transactions, positions, valuation_date))
}

/// The positions export with the latest date in its filename.
pub fn latest_positions_file(dir: &Path) -> LoadResult<(PathBuf, NaiveDate)> {
    let mut latest: Option<(PathBuf, NaiveDate)> = None;
    for path in csv_files_with_prefix(dir, POSITIONS_PREFIX)? {
        let Some(date) = filename_date(&path) else {
            debug!(file = %path.display(), "skipping positions file without a date");
            continue;
        };
        if latest.as_ref().map_or(true, |(_, d)| date > *d) {
            latest = Some((path, date));
        }
    }
    latest.ok_or_else(|| {
        format!(
            "No {}<Mon-DD-YYYY>.csv files found in {}",
            POSITIONS_PREFIX,
            dir.display()
        )
        .into()
    })
}

/// Every history export, in filename order.
pub fn history_files(dir: &Path) -> LoadResult<Vec<PathBuf>> {
    let mut files = csv_files_with_prefix(dir, HISTORY_PREFIX)?;
    files.sort();
    Ok(files)
}

fn csv_files_with_prefix(dir: &Path, prefix: &str) -> LoadResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory '{}': {}", dir.display(), e))?
    {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix) && n.ends_with(".csv"))
            .unwrap_or(false);
        if matches && path.is_file() {
            out.push(path);
        }
    }
    Ok(out)
}

fn filename_date(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let date_part = stem.strip_prefix(POSITIONS_PREFIX)?;
    NaiveDate::parse_from_str(date_part, FILENAME_DATE).ok()
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Header name -> column index, with required columns checked up front.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &csv::StringRecord, table: &str, required: &[&str]) -> Result<Self, PortfolioError> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
            .collect();
        for column in required {
            if !index.contains_key(*column) {
                return Err(PortfolioError::MissingColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(Columns { index })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> &'r str {
        self.index
            .get(column)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .unwrap_or("")
    }
}

fn reader(path: &Path) -> LoadResult<csv::Reader<fs::File>> {
    let rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| format!("Failed to open '{}': {}", path.display(), e))?;
    Ok(rdr)
}

/// Positions snapshot. Rows without an account name (footer text, totals)
/// are dropped; repeated (account, symbol) rows are summed.
pub fn read_positions(path: &Path, rules: &ClassificationRules) -> LoadResult<Vec<Position>> {
    let mut rdr = reader(path)?;
    let cols = Columns::new(
        rdr.headers()?,
        "positions",
        &["Account Number", "Account Name", "Symbol", "Current Value"],
    )?;

    let mut positions: Vec<Position> = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let account = cols.get(&record, "Account Number");
        let account_name = cols.get(&record, "Account Name");
        if account.is_empty() || account_name.is_empty() {
            skipped += 1;
            continue;
        }
        let Some(current_value) = parse_money(cols.get(&record, "Current Value")) else {
            skipped += 1;
            continue;
        };
        let cost_basis = parse_money(cols.get(&record, "Cost Basis Total")).unwrap_or_default();
        let symbol = clean_symbol(cols.get(&record, "Symbol"));
        let description = cols.get(&record, "Description").to_string();

        if let Some(existing) = positions
            .iter_mut()
            .find(|p| p.account_number == account && p.symbol == symbol)
        {
            existing.current_value += current_value;
            existing.cost_basis += cost_basis;
            continue;
        }
        positions.push(Position {
            account_number: account.to_string(),
            account_name: Some(account_name.to_string()),
            asset_class: rules.classify(&symbol, &description),
            symbol,
            description,
            current_value,
            cost_basis,
        });
    }
    debug!(rows = positions.len(), skipped, "read positions");
    Ok(positions)
}

/// One history export. Rows without a parseable run date, an account
/// number, or an amount are dropped.
pub fn read_transactions(path: &Path, settings: &Settings) -> LoadResult<Vec<Transaction>> {
    let mut rdr = reader(path)?;
    let cols = Columns::new(
        rdr.headers()?,
        "transactions",
        &["Run Date", "Account Number", "Action", "Symbol", "Amount ($)"],
    )?;

    let rules = &settings.analysis.classification;
    let mut transactions = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let Some(run_date) = parse_date(cols.get(&record, "Run Date")) else {
            skipped += 1;
            continue;
        };
        let account = cols.get(&record, "Account Number");
        let raw_amount = cols.get(&record, "Amount ($)");
        let amount = match parse_money(raw_amount) {
            Some(a) if !account.is_empty() && !raw_amount.is_empty() => a,
            _ => {
                skipped += 1;
                continue;
            }
        };
        let description = cols.get(&record, "Description").to_string();
        let symbol = match settings.symbol_aliases.get(description.as_str()) {
            Some(alias) => alias.clone(),
            None => clean_symbol(cols.get(&record, "Symbol")),
        };
        transactions.push(Transaction {
            run_date,
            account_number: account.to_string(),
            asset_class: rules.classify(&symbol, &description),
            symbol,
            description,
            amount,
            action: cols.get(&record, "Action").to_string(),
        });
    }
    debug!(file = %path.display(), rows = transactions.len(), skipped, "read history");
    Ok(transactions)
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

/// `$1,234.50`, `-$12.00`, `+$3`, `(45.10)`, `12%` -> decimal.
/// `--` and blank cells are zero; anything else unparseable is `None`.
pub fn parse_money(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() || s == "--" {
        return Some(Decimal::ZERO);
    }
    let mut cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | '+'))
        .collect();
    let negative_parens = cleaned.starts_with('(') && cleaned.ends_with(')');
    if negative_parens {
        cleaned = format!("-{}", &cleaned[1..cleaned.len() - 1]);
    }
    Decimal::from_str(cleaned.trim())
        .or_else(|_| Decimal::from_scientific(cleaned.trim()))
        .ok()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    ROW_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Exports mark core cash positions with trailing asterisks (`SPAXX**`).
fn clean_symbol(raw: &str) -> String {
    raw.trim().trim_end_matches('*').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_irr_core::AssetClass;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const POSITIONS: &str = "\
Account Number,Account Name,Symbol,Description,Quantity,Last Price,Current Value,Cost Basis Total
X111,Individual,SPAXX**,HELD IN MONEY MARKET,,,\"$1,204.10\",
X111,Individual,AAPL,APPLE INC,10,$190.00,\"$1,900.00\",\"$1,500.00\"
X111,Individual,912797KJ5,UNITED STATES TREAS BILLS,1000,$99.00,$990.00,$985.00
,,,,,,,
\"The data and information in this spreadsheet is provided to you solely for your use\"
";

    const HISTORY: &str = "\
Run Date,Account,Account Number,Action,Symbol,Description,Type,Quantity,Price ($),Commission ($),Fees ($),Accrued Interest ($),Amount ($),Settlement Date
01/03/2023,Individual,X111,ELECTRONIC FUNDS TRANSFER RECEIVED (Cash),,No Description,Cash,0,,,,,5000,
01/04/2023,Individual,X111,YOU BOUGHT APPLE INC (AAPL) (Cash),AAPL,APPLE INC,Cash,10,150,,,,-1500,01/06/2023
03/01/2023,Individual,X111,YOU BOUGHT,,FID BLUE CHIP GR K6,Cash,1,100,,,,($100.00),
not a date,Individual,X111,JUNK,,,,,,,,,1,
03/02/2023,Individual,X111,PENDING,,No Description,Cash,,,,,,,
";

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_parse_money_variants() {
        assert_eq!(parse_money("$1,234.50"), Some(dec!(1234.50)));
        assert_eq!(parse_money("-$12.00"), Some(dec!(-12)));
        assert_eq!(parse_money("+$3"), Some(dec!(3)));
        assert_eq!(parse_money("($45.10)"), Some(dec!(-45.10)));
        assert_eq!(parse_money("12%"), Some(dec!(12)));
        assert_eq!(parse_money("--"), Some(Decimal::ZERO));
        assert_eq!(parse_money(""), Some(Decimal::ZERO));
        assert_eq!(parse_money("n/a"), None);
    }

    #[test]
    fn test_latest_positions_file_by_filename_date() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Portfolio_Positions_Dec-29-2023.csv", POSITIONS);
        write(dir.path(), "Portfolio_Positions_Jan-05-2024.csv", POSITIONS);
        write(dir.path(), "Portfolio_Positions_latest.csv", POSITIONS);
        let (path, date) = latest_positions_file(dir.path()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(path.ends_with("Portfolio_Positions_Jan-05-2024.csv"));
    }

    #[test]
    fn test_no_positions_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_positions_file(dir.path()).is_err());
    }

    #[test]
    fn test_load_portfolio_normalises_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Portfolio_Positions_Dec-29-2023.csv", POSITIONS);
        write(dir.path(), "Accounts_History_2023.csv", HISTORY);
        let data = load_portfolio(dir.path(), &Settings::default()).unwrap();

        assert_eq!(data.valuation_date, NaiveDate::from_ymd_opt(2023, 12, 29).unwrap());
        assert_eq!(data.positions.len(), 3);
        let spaxx = &data.positions[0];
        assert_eq!(spaxx.symbol, "SPAXX");
        assert_eq!(spaxx.current_value, dec!(1204.10));
        assert_eq!(spaxx.cost_basis, Decimal::ZERO);
        assert_eq!(spaxx.asset_class, AssetClass::Cash);
        assert_eq!(data.positions[2].asset_class, AssetClass::Bond);

        assert_eq!(data.transactions.len(), 3);
        assert_eq!(data.transactions[0].amount, dec!(5000));
        assert_eq!(data.transactions[1].symbol, "AAPL");
        // aliased by description, parenthesised negative
        assert_eq!(data.transactions[2].symbol, "FBCGX");
        assert_eq!(data.transactions[2].amount, dec!(-100));
        data.validate().unwrap();
    }

    #[test]
    fn test_missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "Portfolio_Positions_Dec-29-2023.csv",
            "Account Number,Symbol,Current Value\nX1,AAPL,$1\n",
        );
        let err = load_portfolio(dir.path(), &Settings::default()).unwrap_err();
        assert!(err.to_string().contains("Account Name"), "{}", err);
    }
}
