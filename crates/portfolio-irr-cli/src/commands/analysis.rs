use clap::Args;
use serde_json::Value;
use tracing::debug;

use portfolio_irr_core::cash_flows::Entity;
use portfolio_irr_core::config::AnalysisConfig;
use portfolio_irr_core::data::PortfolioData;
use portfolio_irr_core::performance::PortfolioAnalyzer;
use portfolio_irr_core::AssetClass;

use crate::input;
use crate::loader;
use crate::settings::Settings;

/// Where the data and settings come from; shared by every analysis command
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding Portfolio_Positions_*.csv and Accounts_History_*.csv
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Already-normalised data set as JSON (overrides --data-dir)
    #[arg(long)]
    pub input: Option<String>,

    /// Settings file (YAML, or JSON by extension). Accounts it does not list
    /// are registered from the positions file; names containing 401K or 403B
    /// are treated as retirement plans
    #[arg(long)]
    pub config: Option<String>,
}

/// Arguments for per-account breakdowns
#[derive(Args)]
pub struct AccountArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Account number
    #[arg(long)]
    pub account: String,
}

/// Arguments for the asset class breakdown
#[derive(Args)]
pub struct AssetClassArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Account number (omit for every account combined)
    #[arg(long)]
    pub account: Option<String>,
}

/// Arguments for a single entity
#[derive(Args)]
pub struct EntityArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Account number (omit for the whole portfolio)
    #[arg(long)]
    pub account: Option<String>,

    /// Symbol within the account
    #[arg(long, conflicts_with = "asset_class", requires = "account")]
    pub symbol: Option<String>,

    /// Asset class within the account, or across all accounts
    #[arg(long, value_enum)]
    pub asset_class: Option<AssetClassArg>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum AssetClassArg {
    Stock,
    Bond,
    Cash,
}

impl From<AssetClassArg> for AssetClass {
    fn from(arg: AssetClassArg) -> Self {
        match arg {
            AssetClassArg::Stock => AssetClass::Stock,
            AssetClassArg::Bond => AssetClass::Bond,
            AssetClassArg::Cash => AssetClass::Cash,
        }
    }
}

/// Load the tables and the settings, registering any account the settings
/// do not mention.
fn prepare(args: &DataArgs) -> Result<(PortfolioData, AnalysisConfig), Box<dyn std::error::Error>> {
    let settings = Settings::load(args.config.as_deref())?;
    let data: PortfolioData = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(value) = input::stdin::read_stdin()? {
        serde_json::from_value(value)?
    } else {
        let dir = input::file::resolve_dir(&args.data_dir)?;
        loader::load_portfolio(&dir, &settings)?
    };
    debug!(
        transactions = data.transactions.len(),
        positions = data.positions.len(),
        valuation_date = %data.valuation_date,
        "data ready"
    );

    let mut config = settings.analysis;
    config.register_missing_accounts(&data);
    Ok((data, config))
}

pub fn run_portfolio(args: DataArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (data, config) = prepare(&args)?;
    let analyzer = PortfolioAnalyzer::new(&data, &config)?;
    let result = analyzer.analyze_portfolio()?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_accounts(args: DataArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (data, config) = prepare(&args)?;
    let analyzer = PortfolioAnalyzer::new(&data, &config)?;
    let result = analyzer.analyze_accounts()?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_holdings(args: AccountArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (data, config) = prepare(&args.data)?;
    let analyzer = PortfolioAnalyzer::new(&data, &config)?;
    let result = analyzer.analyze_holdings(&args.account)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_asset_classes(args: AssetClassArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (data, config) = prepare(&args.data)?;
    let analyzer = PortfolioAnalyzer::new(&data, &config)?;
    let result = match args.account {
        Some(ref account) => analyzer.analyze_asset_classes(account)?,
        None => analyzer.analyze_portfolio_asset_classes()?,
    };
    Ok(serde_json::to_value(result)?)
}

pub fn run_entity(args: EntityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (data, config) = prepare(&args.data)?;
    let entity = match (args.account, args.symbol, args.asset_class) {
        (Some(account), Some(symbol), _) => Entity::symbol(account, symbol),
        (Some(account), None, Some(class)) => Entity::asset_class(account, class.into()),
        (Some(account), None, None) => Entity::account(account),
        (None, _, Some(class)) => Entity::portfolio_asset_class(class.into()),
        (None, _, None) => Entity::Portfolio,
    };
    let analyzer = PortfolioAnalyzer::new(&data, &config)?;
    let result = analyzer.analyze_entity(&entity)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_report(args: DataArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (data, config) = prepare(&args)?;
    let analyzer = PortfolioAnalyzer::new(&data, &config)?;
    let result = analyzer.analyze_all()?;
    Ok(serde_json::to_value(result)?)
}
