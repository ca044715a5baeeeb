use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::KStockError;
use crate::providers::PriceHistoryProvider;
use crate::returns::{ReturnSeries, ReturnTable};
use crate::types::Rate;
use crate::KStockResult;

// ---------------------------------------------------------------------------
// Market reference data
// ---------------------------------------------------------------------------

/// Benchmark index and calibration constants for one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProfile {
    /// Two-letter country code ("US", "KR", ...).
    pub country: String,
    /// Symbol of the benchmark index.
    pub index_symbol: String,
    /// Annual equity risk premium.
    pub risk_premium: Rate,
    /// Annual risk-free rate (one-year government yield).
    pub risk_free_rate: Rate,
}

/// Country lookup table handed to the CAPM estimator. Adding a market means
/// adding a row; nothing here is derived from data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTable {
    pub markets: Vec<MarketProfile>,
}

impl Default for MarketTable {
    fn default() -> Self {
        let row = |country: &str, index: &str, premium: Rate, rf: Rate| MarketProfile {
            country: country.into(),
            index_symbol: index.into(),
            risk_premium: premium,
            risk_free_rate: rf,
        };
        Self {
            markets: vec![
                row("US", "^GSPC", dec!(0.0460), dec!(0.05106)),
                row("KR", "^KS11", dec!(0.0532), dec!(0.03338)),
                row("JP", "^N225", dec!(0.0563), dec!(0.00167)),
            ],
        }
    }
}

impl MarketTable {
    pub fn profile(&self, country: &str) -> KStockResult<&MarketProfile> {
        self.markets
            .iter()
            .find(|m| m.country.eq_ignore_ascii_case(country))
            .ok_or_else(|| {
                KStockError::Configuration(format!(
                    "unknown country code '{}' (configured: {})",
                    country,
                    self.markets
                        .iter()
                        .map(|m| m.country.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Pure formulas
// ---------------------------------------------------------------------------

/// CAPM: E[R] = beta * market_risk_premium + risk_free_rate.
pub fn capm_expected_return(
    beta: Decimal,
    market_risk_premium: Rate,
    risk_free_rate: Rate,
) -> Rate {
    beta * market_risk_premium + risk_free_rate
}

/// Beta of `asset` against `market` over their common dates, from the
/// annualised covariance table. Returns the beta and the number of aligned
/// observations.
pub fn beta(market: &ReturnSeries, asset: &ReturnSeries) -> KStockResult<(Decimal, usize)> {
    let table = ReturnTable::align(&[market.clone(), asset.clone()])?;
    let cov = table.covariance();
    let market_var = cov.variance(0);
    if market_var.is_zero() {
        return Err(KStockError::DivisionByZero {
            context: format!("beta of {}: {} has zero variance", asset.symbol, market.symbol),
        });
    }
    Ok((cov.get(0, 1) / market_var, table.len()))
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Market return series already fetched during this run, keyed by country
/// and date range. Owned by the caller; not meant to be shared across
/// threads.
#[derive(Debug, Default)]
pub struct MarketReturnCache {
    returns: HashMap<(String, NaiveDate, NaiveDate), ReturnSeries>,
}

impl MarketReturnCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapmEstimate {
    pub symbol: String,
    pub country: String,
    pub market_symbol: String,
    pub beta: Decimal,
    pub market_risk_premium: Rate,
    pub risk_free_rate: Rate,
    pub expected_return: Rate,
    pub observations: usize,
}

pub struct CapmEstimator<'a, P: PriceHistoryProvider + ?Sized> {
    provider: &'a P,
    markets: &'a MarketTable,
}

impl<'a, P: PriceHistoryProvider + ?Sized> CapmEstimator<'a, P> {
    pub fn new(provider: &'a P, markets: &'a MarketTable) -> Self {
        Self { provider, markets }
    }

    pub fn estimate(
        &self,
        cache: &mut MarketReturnCache,
        symbol: &str,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<CapmEstimate> {
        let profile = self.markets.profile(country)?;
        let market = self.market_returns(cache, profile, start, end)?;
        let prices = self.provider.fetch_weekly_prices(symbol, start, end)?;
        let asset = ReturnSeries::from_prices(&prices)?;
        self.estimate_against(profile, &market, &asset)
    }

    /// Same as [`estimate`](Self::estimate) for an asset whose weekly returns
    /// are already at hand; only the market series is fetched (or served
    /// from `cache`).
    pub fn estimate_from_returns(
        &self,
        cache: &mut MarketReturnCache,
        asset: &ReturnSeries,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<CapmEstimate> {
        let profile = self.markets.profile(country)?;
        let market = self.market_returns(cache, profile, start, end)?;
        self.estimate_against(profile, &market, asset)
    }

    fn estimate_against(
        &self,
        profile: &MarketProfile,
        market: &ReturnSeries,
        asset: &ReturnSeries,
    ) -> KStockResult<CapmEstimate> {
        let (beta, observations) = beta(market, asset)?;
        let expected_return =
            capm_expected_return(beta, profile.risk_premium, profile.risk_free_rate);

        debug!(
            "capm {} vs {}: beta={} expected={}",
            asset.symbol, profile.index_symbol, beta, expected_return
        );
        Ok(CapmEstimate {
            symbol: asset.symbol.clone(),
            country: profile.country.clone(),
            market_symbol: profile.index_symbol.clone(),
            beta,
            market_risk_premium: profile.risk_premium,
            risk_free_rate: profile.risk_free_rate,
            expected_return,
            observations,
        })
    }

    fn market_returns(
        &self,
        cache: &mut MarketReturnCache,
        profile: &MarketProfile,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<ReturnSeries> {
        let key = (profile.country.clone(), start, end);
        if let Some(hit) = cache.returns.get(&key) {
            debug!("market returns for {} served from cache", profile.country);
            return Ok(hit.clone());
        }
        let prices = self
            .provider
            .fetch_weekly_prices(&profile.index_symbol, start, end)?;
        let returns = ReturnSeries::from_prices(&prices)?;
        cache.returns.insert(key, returns.clone());
        Ok(returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::PriceTick;
    use chrono::Duration;
    use std::cell::RefCell;

    #[test]
    fn test_capm_formula() {
        assert_eq!(
            capm_expected_return(dec!(1.0), dec!(0.05), dec!(0.03)),
            dec!(0.08)
        );
    }

    #[test]
    fn test_unknown_country_is_configuration_error() {
        let table = MarketTable::default();
        assert!(matches!(
            table.profile("DE"),
            Err(KStockError::Configuration(_))
        ));
        assert_eq!(table.profile("kr").unwrap().index_symbol, "^KS11");
    }

    /// Synthetic weekly prices; records every symbol requested.
    struct ScriptedPrices {
        calls: RefCell<Vec<String>>,
    }

    impl PriceHistoryProvider for ScriptedPrices {
        fn id(&self) -> &'static str {
            "SCRIPTED"
        }

        fn fetch_daily_prices(
            &self,
            symbol: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> KStockResult<Vec<PriceTick>> {
            self.calls.borrow_mut().push(symbol.to_string());
            let market = [100, 102, 101, 104, 103, 106];
            let factor = if symbol == "^KS11" { dec!(1) } else { dec!(2) };
            // Asset moves exactly twice the market's weekly change.
            let mut price = dec!(100);
            let mut ticks = Vec::new();
            for (i, level) in market.iter().enumerate() {
                if i > 0 {
                    let prev = Decimal::from(market[i - 1]);
                    let change = Decimal::from(*level) / prev - Decimal::ONE;
                    price *= Decimal::ONE + factor * change;
                }
                let value = if factor == Decimal::ONE {
                    Decimal::from(*level)
                } else {
                    price
                };
                // Fridays starting 2024-01-05
                let date = start + Duration::days(4 + 7 * i as i64);
                ticks.push(PriceTick::new(date, Some(value)));
            }
            Ok(ticks)
        }
    }

    #[test]
    fn test_estimate_beta_two_and_caches_market() {
        let provider = ScriptedPrices {
            calls: RefCell::new(Vec::new()),
        };
        let table = MarketTable::default();
        let estimator = CapmEstimator::new(&provider, &table);
        let mut cache = MarketReturnCache::new();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 9).unwrap();

        let est = estimator
            .estimate(&mut cache, "005930.KS", "KR", start, end)
            .unwrap();
        assert!((est.beta - dec!(2)).abs() < dec!(0.000001));
        assert_eq!(est.observations, 5);
        let expected = dec!(2) * dec!(0.0532) + dec!(0.03338);
        assert!((est.expected_return - expected).abs() < dec!(0.000001));

        estimator
            .estimate(&mut cache, "000660.KS", "KR", start, end)
            .unwrap();
        let market_calls = provider
            .calls
            .borrow()
            .iter()
            .filter(|s| s.as_str() == "^KS11")
            .count();
        assert_eq!(market_calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_estimate_unknown_country_fails_before_fetching() {
        let provider = ScriptedPrices {
            calls: RefCell::new(Vec::new()),
        };
        let table = MarketTable::default();
        let estimator = CapmEstimator::new(&provider, &table);
        let mut cache = MarketReturnCache::new();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 9).unwrap();
        assert!(estimator
            .estimate(&mut cache, "SAP.DE", "EU", start, end)
            .is_err());
        assert!(provider.calls.borrow().is_empty());
    }
}
