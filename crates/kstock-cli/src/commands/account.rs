use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::path::Path;

use kstock_core::holdings::equities_by_value;
use kstock_core::performance::portfolio_returns_from_history;
use kstock_core::providers::HoldingsProvider;
use kstock_core::workflows::{self, DEFAULT_BENCHMARK};

use crate::providers::{CsvPriceDirectory, JsonHoldingsFile};

#[derive(Args)]
pub struct PerformanceArgs {
    #[arg(long)]
    pub holdings: String,
    #[arg(long)]
    pub prices_dir: String,
    /// Benchmark symbol for beta, alpha and the market ratios
    #[arg(long, default_value = DEFAULT_BENCHMARK)]
    pub benchmark: String,
    /// Annual risk-free rate as a decimal
    #[arg(long, default_value = "0.053")]
    pub risk_free_rate: Decimal,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
}

#[derive(Args)]
pub struct HoldingPeriodArgs {
    #[arg(long)]
    pub holdings: String,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
    /// One record per week instead of a single record for the range
    #[arg(long)]
    pub weekly: bool,
}

#[derive(Args)]
pub struct HoldingsArgs {
    #[arg(long)]
    pub holdings: String,
}

pub fn run_performance(args: PerformanceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let holdings = JsonHoldingsFile::open(Path::new(&args.holdings))?;
    let prices = CsvPriceDirectory::new(&args.prices_dir);
    let result = workflows::performance_report(
        &holdings,
        &prices,
        &args.benchmark,
        args.risk_free_rate,
        args.start,
        args.end,
    )?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_holding_period(args: HoldingPeriodArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let holdings = JsonHoldingsFile::open(Path::new(&args.holdings))?;

    if args.weekly {
        let history = holdings.get_history(args.start, args.end)?;
        let returns = portfolio_returns_from_history(&history)?;
        let rows = history
            .iter()
            .zip(returns.points.iter())
            .map(|(record, r)| {
                json!({
                    "start_date": record.start_date,
                    "end_date": record.end_date,
                    "invested_capital": record.invested_capital(),
                    "closing_value": record.closing_value,
                    "pnl": record.pnl(),
                    "pnl_percent": r.value,
                })
            })
            .collect::<Vec<_>>();
        return Ok(json!({ "results": rows }));
    }

    let record = holdings.get_holding_period_record(args.start, args.end)?;
    Ok(json!({
        "result": {
            "start_date": record.start_date,
            "end_date": record.end_date,
            "initial_value": record.initial_value,
            "closing_value": record.closing_value,
            "cash_inflow": record.cash_inflow,
            "cash_outflow": record.cash_outflow,
            "invested_capital": record.invested_capital(),
            "pnl": record.pnl(),
            "pnl_percent": record.pnl_percent()?,
        }
    }))
}

/// Equities by reporting value with their derived prices and P&L.
pub fn run_holdings(args: HoldingsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let holdings = JsonHoldingsFile::open(Path::new(&args.holdings))?;
    let rows = equities_by_value(&holdings.list_held_assets()?)
        .iter()
        .map(|asset| {
            Ok(json!({
                "name": asset.name,
                "symbol": asset.symbol(),
                "currency": asset.currency,
                "quantity": asset.quantity(),
                "market_price": asset.market_price()?,
                "entry_price": asset.entry_price()?,
                "reporting_value": asset.reporting_value(),
                "pnl": asset.pnl(),
                "pnl_percent": asset.pnl_percent()?,
            }))
        })
        .collect::<Result<Vec<_>, kstock_core::KStockError>>()?;
    Ok(json!({ "results": rows }))
}
