//! File-backed implementations of the core provider traits.

pub mod csv_prices;
pub mod json_holdings;

pub use csv_prices::CsvPriceDirectory;
pub use json_holdings::JsonHoldingsFile;
