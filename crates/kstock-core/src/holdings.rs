use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::KStockError;
use crate::types::{Currency, Money, Rate};
use crate::KStockResult;

// ---------------------------------------------------------------------------
// Held assets
// ---------------------------------------------------------------------------

/// A position reported by a brokerage account. `market_value` and any entry
/// value are in the asset's own currency; `exchange_rate` converts them to
/// the reporting currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldAsset {
    pub account_number: String,
    pub name: String,
    pub currency: Currency,
    pub exchange_rate: Decimal,
    pub market_value: Money,
    #[serde(flatten)]
    pub detail: AssetDetail,
}

/// Per-class fields, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetDetail {
    /// Currency balance.
    Cash,
    /// Interest-bearing near-cash instrument (RP, CMA, ...).
    CashEquivalent {
        maturity_date: NaiveDate,
        entry_value: Money,
    },
    Equity {
        symbol: String,
        quantity: Decimal,
        entry_value: Money,
    },
    GoldSpot {
        symbol: String,
        quantity: Decimal,
        entry_value: Money,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Cash,
    CashEquivalent,
    Equity,
    GoldSpot,
}

impl HeldAsset {
    pub fn kind(&self) -> AssetKind {
        match self.detail {
            AssetDetail::Cash => AssetKind::Cash,
            AssetDetail::CashEquivalent { .. } => AssetKind::CashEquivalent,
            AssetDetail::Equity { .. } => AssetKind::Equity,
            AssetDetail::GoldSpot { .. } => AssetKind::GoldSpot,
        }
    }

    /// Cash and cash equivalents.
    pub fn is_cash_like(&self) -> bool {
        matches!(self.kind(), AssetKind::Cash | AssetKind::CashEquivalent)
    }

    /// Market value converted to the reporting currency.
    pub fn reporting_value(&self) -> Money {
        self.market_value * self.exchange_rate
    }

    pub fn symbol(&self) -> Option<&str> {
        match &self.detail {
            AssetDetail::Equity { symbol, .. } | AssetDetail::GoldSpot { symbol, .. } => {
                Some(symbol)
            }
            _ => None,
        }
    }

    pub fn quantity(&self) -> Option<Decimal> {
        match self.detail {
            AssetDetail::Equity { quantity, .. } | AssetDetail::GoldSpot { quantity, .. } => {
                Some(quantity)
            }
            _ => None,
        }
    }

    pub fn entry_value(&self) -> Option<Money> {
        match self.detail {
            AssetDetail::Cash => None,
            AssetDetail::CashEquivalent { entry_value, .. }
            | AssetDetail::Equity { entry_value, .. }
            | AssetDetail::GoldSpot { entry_value, .. } => Some(entry_value),
        }
    }

    pub fn maturity_date(&self) -> Option<NaiveDate> {
        match self.detail {
            AssetDetail::CashEquivalent { maturity_date, .. } => Some(maturity_date),
            _ => None,
        }
    }

    /// Unrealised profit: market value less entry value. `None` for cash.
    pub fn pnl(&self) -> Option<Money> {
        self.entry_value().map(|entry| self.market_value - entry)
    }

    pub fn pnl_percent(&self) -> KStockResult<Option<Rate>> {
        match (self.pnl(), self.entry_value()) {
            (Some(pnl), Some(entry)) => {
                if entry.is_zero() {
                    return Err(KStockError::DivisionByZero {
                        context: format!("pnl_percent of {}: entry value is zero", self.name),
                    });
                }
                Ok(Some(pnl / entry))
            }
            _ => Ok(None),
        }
    }

    pub fn market_price(&self) -> KStockResult<Option<Decimal>> {
        self.per_unit(self.market_value, "market_price")
    }

    pub fn entry_price(&self) -> KStockResult<Option<Decimal>> {
        match self.entry_value() {
            Some(entry) => self.per_unit(entry, "entry_price"),
            None => Ok(None),
        }
    }

    fn per_unit(&self, value: Money, what: &str) -> KStockResult<Option<Decimal>> {
        match self.quantity() {
            Some(q) if q.is_zero() => Err(KStockError::DivisionByZero {
                context: format!("{} of {}: quantity is zero", what, self.name),
            }),
            Some(q) => Ok(Some(value / q)),
            None => Ok(None),
        }
    }
}

/// Equities only, largest reporting value first.
pub fn equities_by_value(assets: &[HeldAsset]) -> Vec<HeldAsset> {
    let mut equities: Vec<HeldAsset> = assets
        .iter()
        .filter(|a| a.kind() == AssetKind::Equity)
        .cloned()
        .collect();
    equities.sort_by(|a, b| b.reporting_value().cmp(&a.reporting_value()));
    equities
}

// ---------------------------------------------------------------------------
// Holding-period performance
// ---------------------------------------------------------------------------

/// Account value at both ends of a period plus the cash moved in and out
/// during it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingPeriodRecord {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_value: Money,
    pub closing_value: Money,
    pub cash_inflow: Money,
    pub cash_outflow: Money,
}

impl HoldingPeriodRecord {
    /// Capital at work over the period: initial + inflow - outflow.
    pub fn invested_capital(&self) -> Money {
        self.initial_value + self.cash_inflow - self.cash_outflow
    }

    pub fn pnl(&self) -> Money {
        self.closing_value - self.invested_capital()
    }

    pub fn pnl_percent(&self) -> KStockResult<Rate> {
        let base = self.invested_capital();
        if base.is_zero() {
            return Err(KStockError::DivisionByZero {
                context: format!(
                    "holding period {} .. {}: invested capital is zero",
                    self.start_date, self.end_date
                ),
            });
        }
        Ok(self.pnl() / base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn equity(name: &str, market_value: Decimal, rate: Decimal) -> HeldAsset {
        HeldAsset {
            account_number: "123-45-678901".into(),
            name: name.into(),
            currency: Currency::USD,
            exchange_rate: rate,
            market_value,
            detail: AssetDetail::Equity {
                symbol: name.into(),
                quantity: dec!(10),
                entry_value: dec!(800),
            },
        }
    }

    #[test]
    fn test_equity_derived_values() {
        let a = equity("AAPL", dec!(1000), dec!(1300));
        assert_eq!(a.pnl(), Some(dec!(200)));
        assert_eq!(a.pnl_percent().unwrap(), Some(dec!(0.25)));
        assert_eq!(a.market_price().unwrap(), Some(dec!(100)));
        assert_eq!(a.entry_price().unwrap(), Some(dec!(80)));
        assert_eq!(a.reporting_value(), dec!(1300000));
    }

    #[test]
    fn test_cash_has_no_pnl() {
        let cash = HeldAsset {
            account_number: "1".into(),
            name: "USD".into(),
            currency: Currency::USD,
            exchange_rate: dec!(1300),
            market_value: dec!(50),
            detail: AssetDetail::Cash,
        };
        assert_eq!(cash.pnl(), None);
        assert_eq!(cash.pnl_percent().unwrap(), None);
        assert_eq!(cash.market_price().unwrap(), None);
        assert!(cash.is_cash_like());
    }

    #[test]
    fn test_zero_quantity_is_reported() {
        let mut a = equity("X", dec!(1), dec!(1));
        a.detail = AssetDetail::GoldSpot {
            symbol: "04020000".into(),
            quantity: Decimal::ZERO,
            entry_value: dec!(1),
        };
        assert!(a.market_price().is_err());
    }

    #[test]
    fn test_equities_sorted_by_reporting_value() {
        let assets = vec![
            equity("SMALL", dec!(10), dec!(1300)),
            equity("BIG", dec!(10), dec!(1)),
        ];
        let mut assets = assets;
        assets[1].market_value = dec!(100000);
        let sorted = equities_by_value(&assets);
        assert_eq!(sorted[0].name, "BIG");
        assert_eq!(sorted[1].name, "SMALL");
    }

    #[test]
    fn test_serde_tagged_by_kind() {
        let json = r#"{
            "account_number": "001-01-000001",
            "name": "RP",
            "currency": "KRW",
            "exchange_rate": "1",
            "market_value": "1005000",
            "kind": "cash_equivalent",
            "maturity_date": "2024-03-01",
            "entry_value": "1000000"
        }"#;
        let asset: HeldAsset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.kind(), AssetKind::CashEquivalent);
        assert_eq!(asset.pnl(), Some(dec!(5000)));
        assert_eq!(asset.pnl_percent().unwrap(), Some(dec!(0.005)));
    }

    #[test]
    fn test_holding_period_pnl() {
        let record = HoldingPeriodRecord {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            initial_value: dec!(1000),
            closing_value: dec!(1100),
            cash_inflow: Decimal::ZERO,
            cash_outflow: Decimal::ZERO,
        };
        assert_eq!(record.pnl(), dec!(100));
        assert_eq!(record.pnl_percent().unwrap(), dec!(0.10));
    }

    #[test]
    fn test_holding_period_with_flows() {
        let record = HoldingPeriodRecord {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            initial_value: dec!(1000),
            closing_value: dec!(1540),
            cash_inflow: dec!(600),
            cash_outflow: dec!(200),
        };
        assert_eq!(record.invested_capital(), dec!(1400));
        assert_eq!(record.pnl(), dec!(140));
        assert_eq!(record.pnl_percent().unwrap(), dec!(0.1));
    }

    #[test]
    fn test_holding_period_zero_capital_is_error() {
        let record = HoldingPeriodRecord {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            initial_value: Decimal::ZERO,
            closing_value: dec!(10),
            cash_inflow: dec!(5),
            cash_outflow: dec!(5),
        };
        assert!(matches!(
            record.pnl_percent(),
            Err(KStockError::DivisionByZero { .. })
        ));
    }
}
