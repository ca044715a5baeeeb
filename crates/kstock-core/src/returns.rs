//! Return series, date alignment and annualised covariance/correlation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::KStockError;
use crate::math::{sample_covariance, sqrt_decimal};
use crate::time_series::PriceSeries;
use crate::types::{Rate, WEEKS_PER_YEAR};
use crate::KStockResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: Rate,
}

/// Period-over-period percentage change of a price series. Each return is
/// dated by the later of its two prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub symbol: String,
    pub points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    /// Pairs separated by a week without a price yield no return.
    pub fn from_prices(prices: &PriceSeries) -> KStockResult<Self> {
        let mut points = Vec::with_capacity(prices.len().saturating_sub(1));
        for pair in prices.points().windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if prices.follows_gap(cur.date) {
                continue;
            }
            if prev.price.is_zero() {
                return Err(KStockError::DivisionByZero {
                    context: format!(
                        "return of {} on {}: previous price is zero",
                        prices.symbol, cur.date
                    ),
                });
            }
            points.push(ReturnPoint {
                date: cur.date,
                value: cur.price / prev.price - Decimal::ONE,
            });
        }
        Ok(Self {
            symbol: prices.symbol.clone(),
            points,
        })
    }

    /// Build from already-computed (date, return) pairs, e.g. holding-period
    /// records. Dates must be strictly increasing.
    pub fn from_points(
        symbol: impl Into<String>,
        points: Vec<ReturnPoint>,
    ) -> KStockResult<Self> {
        let symbol = symbol.into();
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(KStockError::DateError(format!(
                    "{}: return dates must be strictly increasing ({} then {})",
                    symbol, pair[0].date, pair[1].date
                )));
            }
        }
        Ok(Self { symbol, points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<Decimal> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Compounded return over the whole series: prod(1 + r) - 1.
    pub fn cumulative_return(&self) -> Rate {
        self.points
            .iter()
            .fold(Decimal::ONE, |acc, p| acc * (Decimal::ONE + p.value))
            - Decimal::ONE
    }

    /// Compounded return scaled to one year of weekly observations:
    /// (1 + R)^(52 / n) - 1.
    pub fn annualised_return(&self) -> KStockResult<Rate> {
        if self.points.is_empty() {
            return Err(KStockError::DataInsufficiency(format!(
                "{}: no returns to annualise",
                self.symbol
            )));
        }
        let growth = Decimal::ONE + self.cumulative_return();
        if growth <= Decimal::ZERO {
            return Err(KStockError::InvalidInput {
                field: self.symbol.clone(),
                reason: format!("cumulative growth factor {} cannot be annualised", growth),
            });
        }
        let exponent = Decimal::from(WEEKS_PER_YEAR) / Decimal::from(self.points.len() as i64);
        growth
            .checked_powd(exponent)
            .map(|g| g - Decimal::ONE)
            .ok_or_else(|| KStockError::InvalidInput {
                field: self.symbol.clone(),
                reason: "annualised growth overflowed".into(),
            })
    }
}

/// Several return series inner-joined on date. `rows[t][k]` is the return
/// of `symbols[k]` on `dates[t]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnTable {
    pub symbols: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<Vec<Decimal>>,
}

impl ReturnTable {
    /// Keep only dates present in every series. At least two aligned rows
    /// are required.
    pub fn align(series: &[ReturnSeries]) -> KStockResult<Self> {
        if series.is_empty() {
            return Err(KStockError::DataInsufficiency(
                "no return series to align".into(),
            ));
        }
        let symbols: Vec<String> = series.iter().map(|s| s.symbol.clone()).collect();

        let mut by_date: BTreeMap<NaiveDate, Vec<Option<Decimal>>> = BTreeMap::new();
        for (k, s) in series.iter().enumerate() {
            for p in &s.points {
                by_date
                    .entry(p.date)
                    .or_insert_with(|| vec![None; series.len()])[k] = Some(p.value);
            }
        }

        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for (date, values) in by_date {
            if let Some(row) = values.into_iter().collect::<Option<Vec<Decimal>>>() {
                dates.push(date);
                rows.push(row);
            }
        }

        if rows.len() < 2 {
            return Err(KStockError::DataInsufficiency(format!(
                "{} aligned return observation(s) for [{}], at least 2 required",
                rows.len(),
                symbols.join(", ")
            )));
        }
        Ok(Self {
            symbols,
            dates,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, k: usize) -> Vec<Decimal> {
        self.rows.iter().map(|row| row[k]).collect()
    }

    fn sample_covariances(&self) -> Vec<Vec<Decimal>> {
        let columns: Vec<Vec<Decimal>> = (0..self.symbols.len()).map(|k| self.column(k)).collect();
        let n = columns.len();
        let mut cov = vec![vec![Decimal::ZERO; n]; n];
        for i in 0..n {
            for j in i..n {
                let c = sample_covariance(&columns[i], &columns[j]);
                cov[i][j] = c;
                cov[j][i] = c;
            }
        }
        cov
    }

    /// Sample covariance of the table scaled to a yearly convention.
    pub fn covariance(&self) -> CovarianceMatrix {
        let scale = Decimal::from(WEEKS_PER_YEAR);
        let values = self
            .sample_covariances()
            .into_iter()
            .map(|row| row.into_iter().map(|c| c * scale).collect())
            .collect();
        CovarianceMatrix {
            names: self.symbols.clone(),
            values,
        }
    }

    /// Sample correlation of the table. A constant column has no defined
    /// correlation and is reported rather than turned into NaN-like zeros.
    pub fn correlation(&self) -> KStockResult<CorrelationMatrix> {
        let cov = self.sample_covariances();
        let n = cov.len();
        let std_devs: Vec<Decimal> = (0..n).map(|i| sqrt_decimal(cov[i][i])).collect();
        if let Some(k) = std_devs.iter().position(|s| s.is_zero()) {
            return Err(KStockError::DivisionByZero {
                context: format!("correlation: {} has zero variance", self.symbols[k]),
            });
        }
        let mut values = vec![vec![Decimal::ZERO; n]; n];
        for i in 0..n {
            values[i][i] = Decimal::ONE;
            for j in (i + 1)..n {
                let c = cov[i][j] / (std_devs[i] * std_devs[j]);
                values[i][j] = c;
                values[j][i] = c;
            }
        }
        Ok(CorrelationMatrix {
            names: self.symbols.clone(),
            values,
        })
    }
}

/// Annualised covariance over named series. Diagonal = annualised variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    pub names: Vec<String>,
    pub values: Vec<Vec<Decimal>>,
}

impl CovarianceMatrix {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Decimal {
        self.values[i][j]
    }

    pub fn variance(&self, i: usize) -> Decimal {
        self.values[i][i]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub values: Vec<Vec<Decimal>>,
}

impl CorrelationMatrix {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Decimal {
        self.values[i][j]
    }
}

/// Align the given price series into one table of weekly returns.
pub fn return_table(prices: &[PriceSeries]) -> KStockResult<ReturnTable> {
    let series = prices
        .iter()
        .map(ReturnSeries::from_prices)
        .collect::<KStockResult<Vec<_>>>()?;
    ReturnTable::align(&series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::{align_weekly, PricePoint, PriceTick};
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(7 * day as i64)
    }

    fn series(symbol: &str, prices: &[Decimal]) -> PriceSeries {
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint {
                date: d(i as u32),
                price: *p,
            })
            .collect();
        PriceSeries::new(symbol, points).unwrap()
    }

    fn point(day: u32, value: Decimal) -> ReturnPoint {
        ReturnPoint {
            date: d(day),
            value,
        }
    }

    #[test]
    fn test_returns_have_one_fewer_point() {
        let prices = series("A", &[dec!(100), dec!(110), dec!(99), dec!(108.9)]);
        let returns = ReturnSeries::from_prices(&prices).unwrap();
        assert_eq!(returns.len(), 3);
        assert_eq!(returns.points[0].value, dec!(0.1));
        assert_eq!(returns.points[1].value, dec!(-0.1));
        assert_eq!(returns.points[0].date, d(1));
    }

    #[test]
    fn test_cumulative_return_reconstructs_price_ratio() {
        let prices = series("A", &[dec!(100), dec!(125), dec!(80), dec!(120)]);
        let returns = ReturnSeries::from_prices(&prices).unwrap();
        let ratio = dec!(120) / dec!(100);
        assert!((Decimal::ONE + returns.cumulative_return() - ratio).abs() < dec!(0.0000000001));
    }

    #[test]
    fn test_no_return_spans_a_missing_week() {
        let prices =
            series("A", &[dec!(100), dec!(120), dec!(132), dec!(145.2)]).with_gaps(vec![d(2)]);
        let returns = ReturnSeries::from_prices(&prices).unwrap();
        let dates: Vec<NaiveDate> = returns.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(1), d(3)]);
        assert_eq!(returns.values(), vec![dec!(0.2), dec!(0.1)]);
    }

    #[test]
    fn test_suspended_week_from_aligner_is_skipped() {
        let day = |m, dd| NaiveDate::from_ymd_opt(2024, m, dd).unwrap();
        let ticks = vec![
            PriceTick::new(day(1, 5), Some(dec!(100))),
            PriceTick::new(day(1, 19), Some(dec!(110))),
            PriceTick::new(day(1, 26), Some(dec!(121))),
        ];
        let prices = align_weekly("SUSP", &ticks, day(1, 1), day(1, 26)).unwrap();
        let returns = ReturnSeries::from_prices(&prices).unwrap();
        assert_eq!(returns.len(), 1);
        assert_eq!(returns.points[0].date, day(1, 26));
        assert_eq!(returns.points[0].value, dec!(0.1));
    }

    #[test]
    fn test_zero_price_is_reported() {
        let prices = series("A", &[dec!(100), dec!(0), dec!(5)]);
        assert!(matches!(
            ReturnSeries::from_prices(&prices),
            Err(KStockError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_annualised_return_of_a_full_year_is_cumulative() {
        let points = (0..52)
            .map(|i| ReturnPoint {
                date: d(i + 1),
                value: if i == 0 { dec!(0.10) } else { Decimal::ZERO },
            })
            .collect();
        let returns = ReturnSeries::from_points("P", points).unwrap();
        let annual = returns.annualised_return().unwrap();
        assert!((annual - dec!(0.10)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_align_inner_joins_dates() {
        let a = ReturnSeries::from_points(
            "A",
            vec![point(1, dec!(0.01)), point(2, dec!(0.02)), point(3, dec!(0.03))],
        )
        .unwrap();
        let b = ReturnSeries::from_points(
            "B",
            vec![point(2, dec!(0.05)), point(3, dec!(0.06)), point(4, dec!(0.07))],
        )
        .unwrap();
        let table = ReturnTable::align(&[a, b]).unwrap();
        assert_eq!(table.dates, vec![d(2), d(3)]);
        assert_eq!(
            table.rows,
            vec![vec![dec!(0.02), dec!(0.05)], vec![dec!(0.03), dec!(0.06)]]
        );
    }

    #[test]
    fn test_align_requires_two_rows() {
        let a = ReturnSeries::from_points("A", vec![point(1, dec!(0.01))]).unwrap();
        let b = ReturnSeries::from_points("B", vec![point(1, dec!(0.02))]).unwrap();
        assert!(matches!(
            ReturnTable::align(&[a, b]),
            Err(KStockError::DataInsufficiency(_))
        ));
    }

    #[test]
    fn test_covariance_is_annualised_and_symmetric() {
        let a = series("A", &[dec!(100), dec!(101), dec!(103), dec!(102), dec!(105)]);
        let b = series("B", &[dec!(50), dec!(49), dec!(51), dec!(52), dec!(51)]);
        let table = return_table(&[a, b]).unwrap();
        let cov = table.covariance();
        assert_eq!(cov.get(0, 1), cov.get(1, 0));
        let raw = sample_covariance(&table.column(0), &table.column(0));
        assert_eq!(cov.variance(0), raw * dec!(52));
    }

    #[test]
    fn test_correlation_of_scaled_series_is_one() {
        let a = series("A", &[dec!(100), dec!(110), dec!(99), dec!(120)]);
        let b = series("B", &[dec!(10), dec!(11), dec!(9.9), dec!(12)]);
        let corr = return_table(&[a, b]).unwrap().correlation().unwrap();
        assert!((corr.get(0, 1) - Decimal::ONE).abs() < dec!(0.0000001));
        assert_eq!(corr.get(0, 0), Decimal::ONE);
    }

    #[test]
    fn test_correlation_rejects_constant_series() {
        let a = series("A", &[dec!(100), dec!(100), dec!(100)]);
        let b = series("B", &[dec!(10), dec!(11), dec!(12)]);
        assert!(matches!(
            return_table(&[a, b]).unwrap().correlation(),
            Err(KStockError::DivisionByZero { .. })
        ));
    }
}
