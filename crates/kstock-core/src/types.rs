use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Weekly observations per year, used for every annualisation in the crate.
pub const WEEKS_PER_YEAR: u32 = 52;

/// ISO currency code of a holding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Currency {
    #[default]
    KRW,
    USD,
    JPY,
    EUR,
    CNY,
    HKD,
    GBP,
    Other(String),
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::KRW => "KRW",
            Currency::USD => "USD",
            Currency::JPY => "JPY",
            Currency::EUR => "EUR",
            Currency::CNY => "CNY",
            Currency::HKD => "HKD",
            Currency::GBP => "GBP",
            Currency::Other(code) => code,
        }
    }

    /// Country prefix of the ISO code ("KRW" -> "KR"), used to pick the
    /// CAPM market for a holding.
    pub fn country_code(&self) -> String {
        self.code().chars().take(2).collect::<String>().to_uppercase()
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        match code.trim().to_uppercase().as_str() {
            "KRW" => Currency::KRW,
            "USD" => Currency::USD,
            "JPY" => Currency::JPY,
            "EUR" => Currency::EUR,
            "CNY" => Currency::CNY,
            "HKD" => Currency::HKD,
            "GBP" => Currency::GBP,
            other => Currency::Other(other.to_string()),
        }
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
