//! End-to-end runs over a brokerage account: holdings in, weights or
//! performance ratios out. Any provider failure aborts the run.

use chrono::NaiveDate;
use log::{debug, info};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::capm::{CapmEstimate, CapmEstimator, MarketReturnCache, MarketTable};
use crate::error::KStockError;
use crate::holdings::{equities_by_value, HeldAsset};
use crate::performance::{
    calculate_performance_ratios, portfolio_returns_from_history, PerformanceInput,
    PerformanceOutput,
};
use crate::portfolio_optimization::hrp::{allocate_hrp, HrpInput, HrpOutput};
use crate::portfolio_optimization::mean_variance::{
    optimize_mean_variance, MeanVarianceInput, MeanVarianceOutput,
};
use crate::providers::{HoldingsProvider, PriceHistoryProvider};
use crate::returns::{CorrelationMatrix, CovarianceMatrix, ReturnSeries, ReturnTable};
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::KStockResult;

/// Benchmark used by [`performance_report`] when none is given.
pub const DEFAULT_BENCHMARK: &str = "VT";

/// Annual risk-free rate used by [`performance_report`] when none is given.
pub const DEFAULT_RISK_FREE_RATE: Rate = dec!(0.053);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingsMeanVariance {
    /// CAPM estimate per equity, in allocation order.
    pub capm: Vec<CapmEstimate>,
    /// Covariance keyed by asset name.
    pub covariance: CovarianceMatrix,
    pub allocation: MeanVarianceOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingsHrp {
    pub covariance: CovarianceMatrix,
    pub correlation: CorrelationMatrix,
    pub allocation: HrpOutput,
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Mean-variance weights for the equities currently held. Expected returns
/// come from CAPM against each holding's home market.
pub fn optimise_holdings_mean_variance<H, P>(
    holdings: &H,
    prices: &P,
    markets: &MarketTable,
    start: NaiveDate,
    end: NaiveDate,
) -> KStockResult<ComputationOutput<HoldingsMeanVariance>>
where
    H: HoldingsProvider + ?Sized,
    P: PriceHistoryProvider + ?Sized,
{
    let timer = Instant::now();
    let (equities, returns) = equity_returns(holdings, prices, start, end)?;
    let covariance = named_covariance(&equities, &returns)?;

    let estimator = CapmEstimator::new(prices, markets);
    let mut cache = MarketReturnCache::new();
    let mut capm = Vec::with_capacity(equities.len());
    for (asset, series) in equities.iter().zip(returns.iter()) {
        let country = asset.currency.country_code();
        capm.push(estimator.estimate_from_returns(&mut cache, series, &country, start, end)?);
    }

    let input = MeanVarianceInput {
        asset_names: covariance.names.clone(),
        expected_returns: capm.iter().map(|e| e.expected_return).collect(),
        covariance_matrix: covariance.values.clone(),
        max_weight: None,
        tolerance: None,
        max_iterations: None,
    };
    let solved = optimize_mean_variance(&input)?;
    info!(
        "mean-variance over {} holdings converged in {} iterations",
        equities.len(),
        solved.result.iterations
    );

    let elapsed = timer.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Holdings mean-variance (CAPM expected returns, weekly covariance)",
        &serde_json::json!({
            "start": start.to_string(),
            "end": end.to_string(),
            "markets_fetched": cache.len(),
        }),
        solved.warnings,
        elapsed,
        HoldingsMeanVariance {
            capm,
            covariance,
            allocation: solved.result,
        },
    ))
}

/// Hierarchical Risk Parity weights for the equities currently held.
pub fn optimise_holdings_hrp<H, P>(
    holdings: &H,
    prices: &P,
    start: NaiveDate,
    end: NaiveDate,
) -> KStockResult<ComputationOutput<HoldingsHrp>>
where
    H: HoldingsProvider + ?Sized,
    P: PriceHistoryProvider + ?Sized,
{
    let timer = Instant::now();
    let (equities, returns) = equity_returns(holdings, prices, start, end)?;
    let table = ReturnTable::align(&returns)?;
    let names: Vec<String> = equities.iter().map(|a| a.name.clone()).collect();

    let mut covariance = table.covariance();
    covariance.names = names.clone();
    let mut correlation = table.correlation()?;
    correlation.names = names;

    let solved = allocate_hrp(&HrpInput::from_matrices(&covariance, &correlation)?)?;

    let elapsed = timer.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Holdings HRP (weekly correlation clustering)",
        &serde_json::json!({
            "start": start.to_string(),
            "end": end.to_string(),
            "observations": table.len(),
        }),
        solved.warnings,
        elapsed,
        HoldingsHrp {
            covariance,
            correlation,
            allocation: solved.result,
        },
    ))
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

/// Weekly account history against `benchmark` over `[start, end]`.
pub fn performance_report<H, P>(
    holdings: &H,
    prices: &P,
    benchmark: &str,
    risk_free_rate: Rate,
    start: NaiveDate,
    end: NaiveDate,
) -> KStockResult<ComputationOutput<PerformanceOutput>>
where
    H: HoldingsProvider + ?Sized,
    P: PriceHistoryProvider + ?Sized,
{
    let history = holdings.get_history(start, end)?;
    debug!("{} weekly holding-period records from {}", history.len(), holdings.id());
    let portfolio_returns = portfolio_returns_from_history(&history)?;
    let market_prices = prices.fetch_weekly_prices(benchmark, start, end)?;
    let market_returns = ReturnSeries::from_prices(&market_prices)?;
    calculate_performance_ratios(&PerformanceInput {
        portfolio_returns,
        market_returns,
        risk_free_rate,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Held equities (largest first) with their weekly return series.
fn equity_returns<H, P>(
    holdings: &H,
    prices: &P,
    start: NaiveDate,
    end: NaiveDate,
) -> KStockResult<(Vec<HeldAsset>, Vec<ReturnSeries>)>
where
    H: HoldingsProvider + ?Sized,
    P: PriceHistoryProvider + ?Sized,
{
    let equities = equities_by_value(&holdings.list_held_assets()?);
    if equities.is_empty() {
        return Err(KStockError::DataInsufficiency(format!(
            "no equities held in {}",
            holdings.id()
        )));
    }

    let mut returns = Vec::with_capacity(equities.len());
    for asset in &equities {
        let symbol = asset.symbol().ok_or_else(|| KStockError::InvalidInput {
            field: asset.name.clone(),
            reason: "equity without a symbol".into(),
        })?;
        let series = prices.fetch_weekly_prices(symbol, start, end)?;
        returns.push(ReturnSeries::from_prices(&series)?);
    }
    Ok((equities, returns))
}

fn named_covariance(
    equities: &[HeldAsset],
    returns: &[ReturnSeries],
) -> KStockResult<CovarianceMatrix> {
    let mut covariance = ReturnTable::align(returns)?.covariance();
    covariance.names = equities.iter().map(|a| a.name.clone()).collect();
    Ok(covariance)
}
