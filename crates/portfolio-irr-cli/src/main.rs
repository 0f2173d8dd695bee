mod commands;
mod input;
mod loader;
mod output;
mod settings;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::analysis::{AccountArgs, AssetClassArgs, DataArgs, EntityArgs};
use commands::xirr::XirrArgs;

/// Money-weighted returns for a brokerage household
#[derive(Parser)]
#[command(
    name = "pirr",
    version,
    about = "Money-weighted returns (XIRR) and ROI for brokerage portfolios",
    long_about = "Reads brokerage positions and transaction-history exports, builds \
                  per-entity cash-flow series and reports XIRR, ROI, dollar return and \
                  holding period for the portfolio, each account, each asset class \
                  and each holding."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Debug logging to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Whole-portfolio performance
    Portfolio(DataArgs),
    /// Performance of every account, largest first
    Accounts(DataArgs),
    /// Performance of each holding in one account
    Holdings(AccountArgs),
    /// Performance of each asset class, in one account or portfolio-wide
    AssetClasses(AssetClassArgs),
    /// Detailed metrics for a single entity
    Entity(EntityArgs),
    /// Portfolio, accounts and per-account breakdowns in one report
    Report(DataArgs),
    /// Solve XIRR for an explicit list of dated flows
    Xirr(XirrArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
    Markdown,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Portfolio(args) => commands::analysis::run_portfolio(args),
        Commands::Accounts(args) => commands::analysis::run_accounts(args),
        Commands::Holdings(args) => commands::analysis::run_holdings(args),
        Commands::AssetClasses(args) => commands::analysis::run_asset_classes(args),
        Commands::Entity(args) => commands::analysis::run_entity(args),
        Commands::Report(args) => commands::analysis::run_report(args),
        Commands::Xirr(args) => commands::xirr::run_xirr(args),
        Commands::Version => {
            println!("pirr {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
