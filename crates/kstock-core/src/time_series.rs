//! Weekly price alignment.
//!
//! Providers hand back irregular daily ticks. Analytics work on one price per
//! calendar week: the last tick of each Friday-ending week, keyed by the
//! Sunday that closes the week, except the final point which is keyed by the
//! caller's end date so that every series fetched for the same range lines
//! up on its last observation.

use chrono::{Datelike, Duration, NaiveDate};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::KStockError;
use crate::KStockResult;

/// A raw provider observation. `price` is `None` when the provider reported
/// no close for that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub date: NaiveDate,
    pub price: Option<Decimal>,
}

impl PriceTick {
    pub fn new(date: NaiveDate, price: Option<Decimal>) -> Self {
        Self { date, price }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Ordered (date, price) observations for one symbol, dates strictly
/// increasing. A point listed in `gaps` does not follow its predecessor by
/// exactly one trading week, so no weekly return spans that pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    points: Vec<PricePoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    gaps: Vec<NaiveDate>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> KStockResult<Self> {
        let symbol = symbol.into();
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(KStockError::DateError(format!(
                    "{}: dates must be strictly increasing ({} then {})",
                    symbol, pair[0].date, pair[1].date
                )));
            }
        }
        Ok(Self {
            symbol,
            points,
            gaps: Vec::new(),
        })
    }

    /// Mark the points dated `gaps` as following a week with no price.
    pub fn with_gaps(mut self, gaps: Vec<NaiveDate>) -> Self {
        self.gaps = gaps;
        self
    }

    /// Whether the point dated `date` follows a week with no price.
    pub fn follows_gap(&self, date: NaiveDate) -> bool {
        self.gaps.contains(&date)
    }

    pub fn gaps(&self) -> &[NaiveDate] {
        &self.gaps
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// The Sunday closing the week that contains `date` (weeks run Monday to
/// Sunday).
pub fn last_date_of_week(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday() as i64;
    date + Duration::days(6 - weekday)
}

/// The Friday on or after `date`; the label of its Friday-ending week.
fn friday_on_or_after(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday() as i64;
    date + Duration::days((4 - weekday).rem_euclid(7))
}

/// Resample raw ticks to a weekly PriceSeries covering `[start, end]`.
pub fn align_weekly(
    symbol: &str,
    ticks: &[PriceTick],
    start: NaiveDate,
    end: NaiveDate,
) -> KStockResult<PriceSeries> {
    if end < start {
        return Err(KStockError::DateError(format!(
            "{}: end date {} precedes start date {}",
            symbol, end, start
        )));
    }

    let mut observed: Vec<PricePoint> = ticks
        .iter()
        .filter(|t| t.date >= start && t.date <= end)
        .filter_map(|t| t.price.map(|price| PricePoint { date: t.date, price }))
        .collect();
    observed.sort_by_key(|p| p.date);

    if observed.len() < 2 {
        return Err(KStockError::DataInsufficiency(format!(
            "{}: {} priced observation(s) between {} and {}, at least 2 required",
            symbol,
            observed.len(),
            start,
            end
        )));
    }

    // Last tick per Friday-ending week, keyed by that Friday.
    let mut weekly: Vec<PricePoint> = Vec::new();
    for point in observed {
        let friday = friday_on_or_after(point.date);
        match weekly.last_mut() {
            Some(last) if last.date == friday => last.price = point.price,
            _ => weekly.push(PricePoint {
                date: friday,
                price: point.price,
            }),
        }
    }

    // `fridays[k]` is the trading week behind `aligned[k]`.
    let last_index = weekly.len() - 1;
    let mut aligned: Vec<PricePoint> = Vec::with_capacity(weekly.len());
    let mut fridays: Vec<NaiveDate> = Vec::with_capacity(weekly.len());
    for (i, point) in weekly.into_iter().enumerate() {
        if i == last_index {
            // The final point supersedes any week whose Sunday is not before
            // `end`, and takes over the earliest superseded week.
            let mut friday = point.date;
            while aligned.last().is_some_and(|p| p.date >= end) {
                aligned.pop();
                if let Some(superseded) = fridays.pop() {
                    friday = superseded;
                }
            }
            aligned.push(PricePoint {
                date: end,
                price: point.price,
            });
            fridays.push(friday);
        } else {
            aligned.push(PricePoint {
                date: last_date_of_week(point.date),
                price: point.price,
            });
            fridays.push(point.date);
        }
    }

    let gaps: Vec<NaiveDate> = fridays
        .windows(2)
        .zip(aligned.iter().skip(1))
        .filter(|(pair, _)| pair[1].signed_duration_since(pair[0]) > Duration::weeks(1))
        .map(|(_, point)| point.date)
        .collect();
    if !gaps.is_empty() {
        debug!("{}: {} week(s) without a price before {:?}", symbol, gaps.len(), gaps);
    }

    if aligned.len() < 2 {
        return Err(KStockError::DataInsufficiency(format!(
            "{}: only one weekly observation between {} and {}",
            symbol, start, end
        )));
    }

    debug!(
        "aligned {} to {} weekly points ending {}",
        symbol,
        aligned.len(),
        end
    );
    Ok(PriceSeries::new(symbol, aligned)?.with_gaps(gaps))
}

/// Consecutive (week_start, week_end) ranges covering `[start, end]`. Weeks
/// end on Sunday; the final range is cut at `end`.
pub fn week_ranges(
    start: NaiveDate,
    end: NaiveDate,
) -> KStockResult<Vec<(NaiveDate, NaiveDate)>> {
    if end < start {
        return Err(KStockError::DateError(format!(
            "end date {} precedes start date {}",
            end, start
        )));
    }
    let mut ranges = Vec::new();
    let mut week_start = start;
    let mut week_end = last_date_of_week(start);
    while week_end <= end {
        ranges.push((week_start, week_end));
        week_start = week_end + Duration::days(1);
        week_end = week_start + Duration::days(6);
    }
    if week_start <= end {
        ranges.push((week_start, end));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn tick(date: NaiveDate, price: Decimal) -> PriceTick {
        PriceTick::new(date, Some(price))
    }

    #[test]
    fn test_last_date_of_week_is_sunday() {
        // 2024-01-03 is a Wednesday
        assert_eq!(last_date_of_week(d(2024, 1, 3)), d(2024, 1, 7));
        assert_eq!(last_date_of_week(d(2024, 1, 7)), d(2024, 1, 7));
        assert_eq!(last_date_of_week(d(2024, 1, 8)), d(2024, 1, 14));
    }

    #[test]
    fn test_friday_bucket_label() {
        assert_eq!(friday_on_or_after(d(2024, 1, 5)), d(2024, 1, 5));
        assert_eq!(friday_on_or_after(d(2024, 1, 6)), d(2024, 1, 12));
        assert_eq!(friday_on_or_after(d(2024, 1, 1)), d(2024, 1, 5));
    }

    #[test]
    fn test_align_keeps_last_tick_per_week_and_forces_end_date() {
        let ticks = vec![
            tick(d(2024, 1, 2), dec!(100)),
            tick(d(2024, 1, 5), dec!(101)),
            tick(d(2024, 1, 8), dec!(102)),
            PriceTick::new(d(2024, 1, 11), None),
            tick(d(2024, 1, 12), dec!(103)),
            tick(d(2024, 1, 16), dec!(104)),
        ];
        let series = align_weekly("ABC", &ticks, d(2024, 1, 1), d(2024, 1, 17)).unwrap();
        let points = series.points();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, d(2024, 1, 7));
        assert_eq!(points[0].price, dec!(101));
        assert_eq!(points[1].date, d(2024, 1, 14));
        assert_eq!(points[1].price, dec!(103));
        assert_eq!(points[2].date, d(2024, 1, 17));
        assert_eq!(points[2].price, dec!(104));
    }

    #[test]
    fn test_align_drops_ticks_outside_range() {
        let ticks = vec![
            tick(d(2023, 12, 29), dec!(1)),
            tick(d(2024, 1, 5), dec!(2)),
            tick(d(2024, 1, 12), dec!(3)),
            tick(d(2024, 1, 19), dec!(4)),
        ];
        let series = align_weekly("ABC", &ticks, d(2024, 1, 1), d(2024, 1, 12)).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().price, dec!(2));
        assert_eq!(series.last().unwrap().date, d(2024, 1, 12));
    }

    #[test]
    fn test_align_insufficient_ticks() {
        let ticks = vec![
            tick(d(2024, 1, 2), dec!(100)),
            PriceTick::new(d(2024, 1, 9), None),
        ];
        let err = align_weekly("ABC", &ticks, d(2024, 1, 1), d(2024, 1, 31)).unwrap_err();
        assert!(matches!(err, KStockError::DataInsufficiency(_)));
        assert!(align_weekly("ABC", &[], d(2024, 1, 1), d(2024, 1, 31)).is_err());
    }

    #[test]
    fn test_align_single_week_is_insufficient() {
        let ticks = vec![tick(d(2024, 1, 2), dec!(1)), tick(d(2024, 1, 3), dec!(2))];
        let err = align_weekly("ABC", &ticks, d(2024, 1, 1), d(2024, 1, 4)).unwrap_err();
        assert!(matches!(err, KStockError::DataInsufficiency(_)));
    }

    #[test]
    fn test_align_weekend_tick_supersedes_previous_week() {
        // Friday then Saturday tick, end on the Saturday: the Friday's week
        // would be keyed Sunday 2024-01-07, after the end date.
        let ticks = vec![
            tick(d(2023, 12, 29), dec!(1)),
            tick(d(2024, 1, 5), dec!(2)),
            tick(d(2024, 1, 6), dec!(3)),
        ];
        let series = align_weekly("BTC", &ticks, d(2023, 12, 25), d(2024, 1, 6)).unwrap();
        let dates: Vec<NaiveDate> = series.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(2023, 12, 31), d(2024, 1, 6)]);
        assert_eq!(series.last().unwrap().price, dec!(3));
    }

    #[test]
    fn test_align_marks_week_without_ticks() {
        // Nothing trades in the week of 2024-01-12.
        let ticks = vec![
            tick(d(2024, 1, 5), dec!(100)),
            tick(d(2024, 1, 19), dec!(110)),
            tick(d(2024, 1, 26), dec!(121)),
        ];
        let series = align_weekly("SUSP", &ticks, d(2024, 1, 1), d(2024, 1, 26)).unwrap();
        let dates: Vec<NaiveDate> = series.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 7), d(2024, 1, 21), d(2024, 1, 26)]);
        assert_eq!(series.gaps(), &[d(2024, 1, 21)]);
        assert!(!series.follows_gap(d(2024, 1, 26)));
    }

    #[test]
    fn test_align_without_missing_weeks_has_no_gaps() {
        let ticks = vec![
            tick(d(2023, 12, 29), dec!(1)),
            tick(d(2024, 1, 5), dec!(2)),
            tick(d(2024, 1, 6), dec!(3)),
        ];
        let series = align_weekly("BTC", &ticks, d(2023, 12, 25), d(2024, 1, 6)).unwrap();
        assert!(series.gaps().is_empty());
    }

    #[test]
    fn test_week_ranges() {
        // Wednesday 2024-01-03 .. Wednesday 2024-01-17
        let ranges = week_ranges(d(2024, 1, 3), d(2024, 1, 17)).unwrap();
        assert_eq!(
            ranges,
            vec![
                (d(2024, 1, 3), d(2024, 1, 7)),
                (d(2024, 1, 8), d(2024, 1, 14)),
                (d(2024, 1, 15), d(2024, 1, 17)),
            ]
        );
    }

    #[test]
    fn test_week_ranges_ending_on_sunday_has_no_empty_tail() {
        let ranges = week_ranges(d(2024, 1, 3), d(2024, 1, 14)).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1], (d(2024, 1, 8), d(2024, 1, 14)));
    }

    #[test]
    fn test_series_rejects_unordered_points() {
        let points = vec![
            PricePoint {
                date: d(2024, 1, 7),
                price: dec!(1),
            },
            PricePoint {
                date: d(2024, 1, 7),
                price: dec!(2),
            },
        ];
        assert!(PriceSeries::new("X", points).is_err());
    }
}
