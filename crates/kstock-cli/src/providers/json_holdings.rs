use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use kstock_core::holdings::{HeldAsset, HoldingPeriodRecord};
use kstock_core::providers::HoldingsProvider;
use kstock_core::{KStockError, KStockResult};

const SOURCE_ID: &str = "JSON";

/// Account snapshot exported to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldingsDocument {
    pub assets: Vec<HeldAsset>,
    /// Holding-period records at any granularity finer than the ranges
    /// that will be requested (daily or weekly).
    #[serde(default)]
    pub history: Vec<HoldingPeriodRecord>,
}

/// Holdings and performance history read from a JSON document of the form
/// `{"assets": [...], "history": [...]}`.
pub struct JsonHoldingsFile {
    document: HoldingsDocument,
}

impl JsonHoldingsFile {
    pub fn open(path: &Path) -> KStockResult<Self> {
        tracing::debug!(path = %path.display(), "loading holdings");
        let contents = fs::read_to_string(path).map_err(|e| {
            KStockError::upstream(SOURCE_ID, path.display().to_string(), e.to_string())
        })?;
        let mut document: HoldingsDocument = serde_json::from_str(&contents).map_err(|e| {
            KStockError::upstream(SOURCE_ID, path.display().to_string(), e.to_string())
        })?;
        document.history.sort_by_key(|r| r.start_date);
        Ok(Self { document })
    }

    pub fn from_document(mut document: HoldingsDocument) -> Self {
        document.history.sort_by_key(|r| r.start_date);
        Self { document }
    }
}

impl HoldingsProvider for JsonHoldingsFile {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn list_held_assets(&self) -> KStockResult<Vec<HeldAsset>> {
        Ok(self.document.assets.clone())
    }

    /// Chains the stored records that fall inside `[start, end]`: opening
    /// value of the first, closing value of the last, flows summed.
    fn get_holding_period_record(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> KStockResult<HoldingPeriodRecord> {
        let inside: Vec<&HoldingPeriodRecord> = self
            .document
            .history
            .iter()
            .filter(|r| r.start_date >= start && r.end_date <= end)
            .collect();
        let (first, last) = match (inside.first(), inside.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(KStockError::upstream(
                    SOURCE_ID,
                    format!("{} .. {}", start, end),
                    "no holding-period records in range",
                ))
            }
        };
        Ok(HoldingPeriodRecord {
            start_date: start,
            end_date: end,
            initial_value: first.initial_value,
            closing_value: last.closing_value,
            cash_inflow: inside.iter().map(|r| r.cash_inflow).sum::<Decimal>(),
            cash_outflow: inside.iter().map(|r| r.cash_outflow).sum::<Decimal>(),
        })
    }
}
