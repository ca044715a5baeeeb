use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kstock_core::providers::PriceHistoryProvider;
use kstock_core::time_series::PriceTick;
use kstock_core::{KStockError, KStockResult};

const SOURCE_ID: &str = "CSV";

/// Daily closes stored one file per symbol: `<dir>/<SYMBOL>.csv` with a
/// `date,close` header. An empty close is a missing price.
pub struct CsvPriceDirectory {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CloseRow {
    date: NaiveDate,
    close: Option<Decimal>,
}

impl CsvPriceDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol))
    }
}

impl PriceHistoryProvider for CsvPriceDirectory {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn fetch_daily_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<Vec<PriceTick>> {
        let path = self.path_for(symbol);
        tracing::debug!(symbol, path = %path.display(), "reading daily closes");
        let mut ticks =
            read_closes(&path).map_err(|e| KStockError::upstream(SOURCE_ID, symbol, e))?;
        ticks.retain(|t| t.date >= start && t.date <= end);
        ticks.sort_by_key(|t| t.date);
        Ok(ticks)
    }
}

fn read_closes(path: &Path) -> Result<Vec<PriceTick>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| format!("cannot open '{}': {}", path.display(), e))?;
    reader
        .deserialize::<CloseRow>()
        .enumerate()
        .map(|(i, row)| {
            row.map(|r| PriceTick::new(r.date, r.close))
                .map_err(|e| format!("'{}' row {}: {}", path.display(), i + 1, e))
        })
        .collect()
}
