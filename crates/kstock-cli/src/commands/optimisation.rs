use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use serde_json::Value;
use std::path::Path;

use kstock_core::portfolio_optimization::hrp::{self, HrpInput};
use kstock_core::portfolio_optimization::mean_variance::{self, MeanVarianceInput};
use kstock_core::portfolio_optimization::{PortfolioWeights, DISPLAY_CUTOFF};
use kstock_core::workflows;

use crate::config::load_markets;
use crate::providers::{CsvPriceDirectory, JsonHoldingsFile};

use super::read_input;

#[derive(Args)]
pub struct MeanVarianceArgs {
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Args)]
pub struct HrpArgs {
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AllocationMethod {
    MeanVariance,
    Hrp,
}

#[derive(Args)]
pub struct OptimiseHoldingsArgs {
    /// Holdings document ({"assets": [...], "history": [...]})
    #[arg(long)]
    pub holdings: String,
    #[arg(long)]
    pub prices_dir: String,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
    #[arg(long, value_enum, default_value = "mean-variance")]
    pub method: AllocationMethod,
    /// Market table override (JSON or YAML)
    #[arg(long)]
    pub markets: Option<String>,
}

pub fn run_mean_variance(args: MeanVarianceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mv_input: MeanVarianceInput =
        read_input(args.input.as_deref(), "mean-variance optimization")?;
    let result = mean_variance::optimize_mean_variance(&mv_input)?;
    let mut value = serde_json::to_value(&result)?;
    attach_display_weights(&mut value, &result.result.weights)?;
    Ok(value)
}

pub fn run_hrp(args: HrpArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let hrp_input: HrpInput = read_input(args.input.as_deref(), "HRP allocation")?;
    let result = hrp::allocate_hrp(&hrp_input)?;
    let mut value = serde_json::to_value(&result)?;
    attach_display_weights(&mut value, &result.result.weights)?;
    Ok(value)
}

pub fn run_optimise_holdings(
    args: OptimiseHoldingsArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let holdings = JsonHoldingsFile::open(Path::new(&args.holdings))?;
    let prices = CsvPriceDirectory::new(&args.prices_dir);

    match args.method {
        AllocationMethod::MeanVariance => {
            let markets = load_markets(args.markets.as_deref())?;
            let result = workflows::optimise_holdings_mean_variance(
                &holdings, &prices, &markets, args.start, args.end,
            )?;
            let mut value = serde_json::to_value(&result)?;
            attach_display_weights(&mut value, &result.result.allocation.weights)?;
            Ok(value)
        }
        AllocationMethod::Hrp => {
            let result =
                workflows::optimise_holdings_hrp(&holdings, &prices, args.start, args.end)?;
            let mut value = serde_json::to_value(&result)?;
            attach_display_weights(&mut value, &result.result.allocation.weights)?;
            Ok(value)
        }
    }
}

/// Add the non-negligible weights, largest first, beside the raw result.
fn attach_display_weights(
    value: &mut Value,
    weights: &PortfolioWeights,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(result) = value.get_mut("result").and_then(Value::as_object_mut) {
        result.insert(
            "display_weights".into(),
            serde_json::to_value(weights.displayable(DISPLAY_CUTOFF))?,
        );
    }
    Ok(())
}
