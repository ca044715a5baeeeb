mod commands;
mod config;
mod input;
mod logging;
mod output;
mod providers;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::account::{HoldingPeriodArgs, HoldingsArgs, PerformanceArgs};
use commands::analytics::{CapmArgs, CovarianceArgs, WeeklyPricesArgs};
use commands::optimisation::{HrpArgs, MeanVarianceArgs, OptimiseHoldingsArgs};

/// Portfolio analytics over brokerage holdings
#[derive(Parser)]
#[command(
    name = "kstock",
    version,
    about = "Portfolio analytics over brokerage holdings",
    long_about = "Weekly price alignment, annualised covariance, CAPM expected returns, \
                  mean-variance and Hierarchical Risk Parity allocation, and \
                  risk-adjusted performance of a brokerage account, all in decimal \
                  precision. Prices are read from <dir>/<SYMBOL>.csv files and holdings \
                  from a JSON document."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Weekly price series aligned to an end date
    WeeklyPrices(WeeklyPricesArgs),
    /// Annualised covariance (and correlation) of weekly returns
    Covariance(CovarianceArgs),
    /// CAPM beta and expected return against the home market index
    Capm(CapmArgs),
    /// Long-only mean-variance optimisation from a JSON input
    MeanVariance(MeanVarianceArgs),
    /// Hierarchical Risk Parity allocation from a JSON input
    Hrp(HrpArgs),
    /// Allocate across the equities in a holdings document
    OptimiseHoldings(OptimiseHoldingsArgs),
    /// Sharpe, Treynor and Jensen's alpha of the account against a benchmark
    Performance(PerformanceArgs),
    /// Holding-period P&L for a date range
    HoldingPeriod(HoldingPeriodArgs),
    /// Held equities with derived prices and P&L
    Holdings(HoldingsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();
    logging::init_tracing();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::WeeklyPrices(args) => commands::analytics::run_weekly_prices(args),
        Commands::Covariance(args) => commands::analytics::run_covariance(args),
        Commands::Capm(args) => commands::analytics::run_capm(args),
        Commands::MeanVariance(args) => commands::optimisation::run_mean_variance(args),
        Commands::Hrp(args) => commands::optimisation::run_hrp(args),
        Commands::OptimiseHoldings(args) => commands::optimisation::run_optimise_holdings(args),
        Commands::Performance(args) => commands::account::run_performance(args),
        Commands::HoldingPeriod(args) => commands::account::run_holding_period(args),
        Commands::Holdings(args) => commands::account::run_holdings(args),
        Commands::Version => {
            println!("kstock {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
