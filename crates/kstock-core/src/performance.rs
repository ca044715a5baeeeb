//! Risk-adjusted performance of an account against a market benchmark.
//!
//! Inputs are weekly return series. Returns are compounded over the period
//! and annualised with 52 weeks per year; variances are sample variances
//! scaled by the same factor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::KStockError;
use crate::holdings::HoldingPeriodRecord;
use crate::math::sqrt_decimal;
use crate::returns::{ReturnPoint, ReturnSeries, ReturnTable};
use crate::types::{with_metadata, ComputationOutput, Rate, WEEKS_PER_YEAR};
use crate::KStockResult;

/// Symbol given to the account's own return series.
pub const PORTFOLIO_SYMBOL: &str = "PORTFOLIO";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceInput {
    pub portfolio_returns: ReturnSeries,
    pub market_returns: ReturnSeries,
    /// Annual risk-free rate.
    pub risk_free_rate: Rate,
}

/// Ratios for one side of the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSet {
    pub symbol: String,
    /// Compounded return over the whole period.
    pub period_return: Rate,
    pub annualised_return: Rate,
    pub annualised_volatility: Decimal,
    pub sharpe_ratio: Decimal,
    pub treynor_ratio: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceOutput {
    pub portfolio: RatioSet,
    pub market: RatioSet,
    /// Portfolio beta against the market over the common dates.
    pub beta: Decimal,
    pub jensens_alpha: Rate,
    pub risk_free_rate: Rate,
    /// Weeks present in both series.
    pub observations: usize,
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// (R - rf) / sigma
pub fn sharpe_ratio(
    annual_return: Rate,
    risk_free_rate: Rate,
    annual_volatility: Decimal,
) -> KStockResult<Decimal> {
    if annual_volatility.is_zero() {
        return Err(KStockError::DivisionByZero {
            context: "sharpe ratio: volatility is zero".into(),
        });
    }
    Ok((annual_return - risk_free_rate) / annual_volatility)
}

/// (R - rf) / beta
pub fn treynor_ratio(
    annual_return: Rate,
    risk_free_rate: Rate,
    beta: Decimal,
) -> KStockResult<Decimal> {
    if beta.is_zero() {
        return Err(KStockError::DivisionByZero {
            context: "treynor ratio: beta is zero".into(),
        });
    }
    Ok((annual_return - risk_free_rate) / beta)
}

/// Rp - (beta * (Rm - rf) + rf)
pub fn jensens_alpha(
    portfolio_return: Rate,
    market_return: Rate,
    risk_free_rate: Rate,
    beta: Decimal,
) -> Rate {
    portfolio_return - (beta * (market_return - risk_free_rate) + risk_free_rate)
}

/// Weekly account returns from holding-period records, dated by each
/// record's end date.
pub fn portfolio_returns_from_history(
    records: &[HoldingPeriodRecord],
) -> KStockResult<ReturnSeries> {
    let points = records
        .iter()
        .map(|r| {
            Ok(ReturnPoint {
                date: r.end_date,
                value: r.pnl_percent()?,
            })
        })
        .collect::<KStockResult<Vec<_>>>()?;
    ReturnSeries::from_points(PORTFOLIO_SYMBOL, points)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

pub fn calculate_performance_ratios(
    input: &PerformanceInput,
) -> KStockResult<ComputationOutput<PerformanceOutput>> {
    let start = Instant::now();
    let rf = input.risk_free_rate;

    let table = ReturnTable::align(&[
        input.market_returns.clone(),
        input.portfolio_returns.clone(),
    ])?;
    let cov = table.covariance();
    let market_var = cov.variance(0);
    if market_var.is_zero() {
        return Err(KStockError::DivisionByZero {
            context: format!("beta: {} has zero variance", input.market_returns.symbol),
        });
    }
    let beta = cov.get(0, 1) / market_var;

    // Returns compound over each series' own weeks; volatilities come from
    // the same common-week table as beta.
    let portfolio_return = input.portfolio_returns.annualised_return()?;
    let market_return = input.market_returns.annualised_return()?;
    let portfolio_vol = sqrt_decimal(cov.variance(1));
    let market_vol = sqrt_decimal(market_var);

    let portfolio = RatioSet {
        symbol: input.portfolio_returns.symbol.clone(),
        period_return: input.portfolio_returns.cumulative_return(),
        annualised_return: portfolio_return,
        annualised_volatility: portfolio_vol,
        sharpe_ratio: sharpe_ratio(portfolio_return, rf, portfolio_vol)?,
        treynor_ratio: treynor_ratio(portfolio_return, rf, beta)?,
    };
    // The market's beta against itself is one.
    let market = RatioSet {
        symbol: input.market_returns.symbol.clone(),
        period_return: input.market_returns.cumulative_return(),
        annualised_return: market_return,
        annualised_volatility: market_vol,
        sharpe_ratio: sharpe_ratio(market_return, rf, market_vol)?,
        treynor_ratio: market_return - rf,
    };

    let mut warnings = Vec::new();
    if table.len() < input.portfolio_returns.len() || table.len() < input.market_returns.len() {
        warnings.push(format!(
            "Beta uses {} common weeks out of {} portfolio and {} market observations",
            table.len(),
            input.portfolio_returns.len(),
            input.market_returns.len()
        ));
    }

    let output = PerformanceOutput {
        jensens_alpha: jensens_alpha(portfolio_return, market_return, rf, beta),
        portfolio,
        market,
        beta,
        risk_free_rate: rf,
        observations: table.len(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Performance ratios (Sharpe, Treynor, Jensen's alpha) on weekly returns",
        &serde_json::json!({
            "risk_free_rate": rf.to_string(),
            "periods_per_year": WEEKS_PER_YEAR,
            "market": input.market_returns.symbol,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal_macros::dec;

    fn weekly(symbol: &str, values: &[Decimal]) -> ReturnSeries {
        weekly_from(symbol, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(), values)
    }

    fn weekly_from(symbol: &str, first: NaiveDate, values: &[Decimal]) -> ReturnSeries {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| ReturnPoint {
                date: first + Duration::weeks(i as i64),
                value: *v,
            })
            .collect();
        ReturnSeries::from_points(symbol, points).unwrap()
    }

    fn market() -> ReturnSeries {
        weekly("VT", &[dec!(0.01), dec!(-0.005), dec!(0.02), dec!(0.0), dec!(0.004)])
    }

    #[test]
    fn test_formulas() {
        assert_eq!(sharpe_ratio(dec!(0.12), dec!(0.02), dec!(0.2)).unwrap(), dec!(0.5));
        assert_eq!(treynor_ratio(dec!(0.12), dec!(0.02), dec!(2)).unwrap(), dec!(0.05));
        assert_eq!(jensens_alpha(dec!(0.15), dec!(0.10), dec!(0.02), dec!(1.5)), dec!(0.01));
    }

    #[test]
    fn test_portfolio_equal_to_market() {
        let mut portfolio = market();
        portfolio.symbol = PORTFOLIO_SYMBOL.into();
        let input = PerformanceInput {
            portfolio_returns: portfolio,
            market_returns: market(),
            risk_free_rate: dec!(0.053),
        };
        let out = calculate_performance_ratios(&input).unwrap().result;
        let tol = dec!(0.0000001);
        assert!((out.beta - Decimal::ONE).abs() < tol);
        assert!(out.jensens_alpha.abs() < tol);
        assert_eq!(out.market.treynor_ratio, out.market.annualised_return - dec!(0.053));
        assert!((out.portfolio.treynor_ratio - out.market.treynor_ratio).abs() < tol);
        assert!((out.portfolio.sharpe_ratio - out.market.sharpe_ratio).abs() < tol);
        assert_eq!(out.observations, 5);
    }

    #[test]
    fn test_levered_portfolio_has_beta_two() {
        let doubled: Vec<Decimal> = market().values().iter().map(|v| *v * dec!(2)).collect();
        let input = PerformanceInput {
            portfolio_returns: weekly(PORTFOLIO_SYMBOL, &doubled),
            market_returns: market(),
            risk_free_rate: dec!(0.03),
        };
        let out = calculate_performance_ratios(&input).unwrap().result;
        assert!((out.beta - dec!(2)).abs() < dec!(0.0000001));
        let doubled_vol = dec!(2) * out.market.annualised_volatility;
        assert!((out.portfolio.annualised_volatility - doubled_vol).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_volatility_uses_common_weeks() {
        // The account has one extra leading week, as when its first record
        // predates the first market return.
        let portfolio = weekly(
            PORTFOLIO_SYMBOL,
            &[dec!(0.10), dec!(0.01), dec!(-0.01), dec!(0.02), dec!(0.0)],
        );
        let market = weekly_from(
            "VT",
            NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
            &[dec!(0.01), dec!(-0.005), dec!(0.02), dec!(0.004)],
        );
        let input = PerformanceInput {
            portfolio_returns: portfolio,
            market_returns: market,
            risk_free_rate: dec!(0.053),
        };
        let out = calculate_performance_ratios(&input).unwrap();
        let result = out.result;
        assert_eq!(result.observations, 4);
        assert!(!out.warnings.is_empty());

        // Common weeks 0.01, -0.01, 0.02, 0.0: squared deviations sum to
        // 0.0005, sample variance 0.0005 / 3, annualised by 52.
        let expected_var = dec!(0.0005) / dec!(3) * dec!(52);
        let vol = result.portfolio.annualised_volatility;
        assert!((vol * vol - expected_var).abs() < dec!(0.0000000001), "vol {}", vol);

        // The annualised return still compounds all five weeks.
        let compounded = dec!(1.10) * dec!(1.01) * dec!(0.99) * dec!(1.02) - Decimal::ONE;
        assert!((result.portfolio.period_return - compounded).abs() < dec!(0.0000000001));
        assert!(
            (result.portfolio.sharpe_ratio
                - (result.portfolio.annualised_return - dec!(0.053)) / vol)
                .abs()
                < dec!(0.0000001)
        );
    }

    #[test]
    fn test_flat_market_is_division_by_zero() {
        let input = PerformanceInput {
            portfolio_returns: weekly(PORTFOLIO_SYMBOL, &[dec!(0.01), dec!(0.02), dec!(0.03)]),
            market_returns: weekly("VT", &[dec!(0.01), dec!(0.01), dec!(0.01)]),
            risk_free_rate: dec!(0.03),
        };
        assert!(matches!(
            calculate_performance_ratios(&input),
            Err(KStockError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_single_common_week_is_insufficient() {
        let input = PerformanceInput {
            portfolio_returns: weekly(PORTFOLIO_SYMBOL, &[dec!(0.01)]),
            market_returns: market(),
            risk_free_rate: dec!(0.03),
        };
        assert!(matches!(
            calculate_performance_ratios(&input),
            Err(KStockError::DataInsufficiency(_))
        ));
    }

    #[test]
    fn test_returns_from_history() {
        let record = |start: (u32, u32), end: (u32, u32), initial, closing| HoldingPeriodRecord {
            start_date: NaiveDate::from_ymd_opt(2024, start.0, start.1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, end.0, end.1).unwrap(),
            initial_value: initial,
            closing_value: closing,
            cash_inflow: Decimal::ZERO,
            cash_outflow: Decimal::ZERO,
        };
        let history = vec![
            record((1, 1), (1, 7), dec!(1000), dec!(1100)),
            record((1, 8), (1, 14), dec!(1100), dec!(1045)),
        ];
        let series = portfolio_returns_from_history(&history).unwrap();
        assert_eq!(series.values(), vec![dec!(0.1), dec!(-0.05)]);
        assert_eq!(series.points[1].date, NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
    }
}
