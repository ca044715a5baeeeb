//! Seams to the outside world: price history and brokerage holdings.
//!
//! The analytics never care whether data came from a vendor API, a scraped
//! brokerage portal or files on disk; they only see these traits. Every
//! implementation must surface its failures as
//! [`KStockError::UpstreamFetch`](crate::KStockError::UpstreamFetch) rather
//! than returning empty data.

use chrono::NaiveDate;
use log::debug;

use crate::holdings::{HeldAsset, HoldingPeriodRecord};
use crate::time_series::{align_weekly, week_ranges, PriceSeries, PriceTick};
use crate::KStockResult;

/// Source of daily price history.
pub trait PriceHistoryProvider {
    /// Identifier used in logs and error context.
    fn id(&self) -> &'static str;

    /// Raw daily ticks for `symbol` over `[start, end]`, ascending by date.
    fn fetch_daily_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<Vec<PriceTick>>;

    /// Weekly series for `symbol`, aligned so its last point is `end`.
    fn fetch_weekly_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<PriceSeries> {
        debug!("fetching {} from {} ({} .. {})", symbol, self.id(), start, end);
        let ticks = self.fetch_daily_prices(symbol, start, end)?;
        align_weekly(symbol, &ticks, start, end)
    }
}

/// Source of brokerage holdings and holding-period performance.
pub trait HoldingsProvider {
    fn id(&self) -> &'static str;

    fn list_held_assets(&self) -> KStockResult<Vec<HeldAsset>>;

    fn get_holding_period_record(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<HoldingPeriodRecord>;

    /// One record per Sunday-ending week in `[start, end]`.
    fn get_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<Vec<HoldingPeriodRecord>> {
        week_ranges(start, end)?
            .into_iter()
            .map(|(week_start, week_end)| self.get_holding_period_record(week_start, week_end))
            .collect()
    }
}
