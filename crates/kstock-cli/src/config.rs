use kstock_core::capm::MarketTable;

use crate::input::file::read_document;

/// Market table from `--markets` (JSON or YAML), or the built-in US/KR/JP
/// rows.
pub fn load_markets(path: Option<&str>) -> Result<MarketTable, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(MarketTable::default());
    };
    let table: MarketTable = read_document(path)?;
    tracing::debug!(markets = table.markets.len(), path, "loaded market table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::fs;

    #[test]
    fn test_default_table_without_path() {
        let table = load_markets(None).unwrap();
        assert_eq!(table.profile("KR").unwrap().index_symbol, "^KS11");
    }

    #[test]
    fn test_yaml_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markets.yaml");
        fs::write(
            &path,
            "markets:\n  - country: HK\n    index_symbol: \"^HSI\"\n    risk_premium: \"0.06\"\n    risk_free_rate: \"0.04\"\n",
        )
        .unwrap();
        let table = load_markets(path.to_str()).unwrap();
        let hk = table.profile("HK").unwrap();
        assert_eq!(hk.risk_premium, dec!(0.06));
        assert!(table.profile("KR").is_err());
    }
}
