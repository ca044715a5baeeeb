use chrono::NaiveDate;
use clap::Args;
use serde_json::{json, Value};

use kstock_core::capm::{CapmEstimator, MarketReturnCache};
use kstock_core::providers::PriceHistoryProvider;
use kstock_core::returns::return_table;

use crate::config::load_markets;
use crate::providers::CsvPriceDirectory;

#[derive(Args)]
pub struct WeeklyPricesArgs {
    /// Directory holding <SYMBOL>.csv files
    #[arg(long)]
    pub prices_dir: String,
    #[arg(long)]
    pub symbol: String,
    /// First date, YYYY-MM-DD
    #[arg(long)]
    pub start: NaiveDate,
    /// Last date, YYYY-MM-DD; the series ends exactly here
    #[arg(long)]
    pub end: NaiveDate,
}

#[derive(Args)]
pub struct CovarianceArgs {
    #[arg(long)]
    pub prices_dir: String,
    /// Comma-separated symbols
    #[arg(long, value_delimiter = ',', required = true)]
    pub symbols: Vec<String>,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
    /// Also report the correlation matrix
    #[arg(long)]
    pub correlation: bool,
}

#[derive(Args)]
pub struct CapmArgs {
    #[arg(long)]
    pub prices_dir: String,
    /// One or more symbols sharing a home market
    #[arg(long, value_delimiter = ',', required = true)]
    pub symbols: Vec<String>,
    /// Two-letter country code (US, KR, JP, ...)
    #[arg(long)]
    pub country: String,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
    /// Market table override (JSON or YAML)
    #[arg(long)]
    pub markets: Option<String>,
}

pub fn run_weekly_prices(args: WeeklyPricesArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let provider = CsvPriceDirectory::new(&args.prices_dir);
    let series = provider.fetch_weekly_prices(&args.symbol, args.start, args.end)?;
    Ok(json!({
        "symbol": series.symbol,
        "results": series.points(),
    }))
}

pub fn run_covariance(args: CovarianceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let provider = CsvPriceDirectory::new(&args.prices_dir);
    let series = args
        .symbols
        .iter()
        .map(|s| provider.fetch_weekly_prices(s, args.start, args.end))
        .collect::<Result<Vec<_>, _>>()?;
    let table = return_table(&series)?;

    let mut out = json!({
        "observations": table.len(),
        "covariance": table.covariance(),
    });
    if args.correlation {
        out["correlation"] = serde_json::to_value(table.correlation()?)?;
    }
    Ok(json!({ "result": out }))
}

pub fn run_capm(args: CapmArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let markets = load_markets(args.markets.as_deref())?;
    let provider = CsvPriceDirectory::new(&args.prices_dir);
    let estimator = CapmEstimator::new(&provider, &markets);
    let mut cache = MarketReturnCache::new();

    let estimates = args
        .symbols
        .iter()
        .map(|s| estimator.estimate(&mut cache, s, &args.country, args.start, args.end))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "results": estimates }))
}
