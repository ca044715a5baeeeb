use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Weights smaller than this are treated as solver noise when printing.
/// Only a presentation threshold: the unfiltered weights stay authoritative.
pub const DISPLAY_CUTOFF: Decimal = dec!(0.00005);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub name: String,
    pub weight: Decimal,
}

/// Asset name to non-negative weight, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortfolioWeights {
    pub weights: Vec<AssetWeight>,
}

impl PortfolioWeights {
    pub fn from_parts(names: &[String], weights: &[Decimal]) -> Self {
        Self {
            weights: names
                .iter()
                .zip(weights.iter())
                .map(|(name, weight)| AssetWeight {
                    name: name.clone(),
                    weight: *weight,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> Decimal {
        self.weights.iter().map(|w| w.weight).sum()
    }

    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.weights
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.weight)
    }

    pub fn values(&self) -> Vec<Decimal> {
        self.weights.iter().map(|w| w.weight).collect()
    }

    /// Largest weight first; ties keep input order.
    pub fn sorted_descending(&self) -> Vec<AssetWeight> {
        let mut sorted = self.weights.clone();
        sorted.sort_by(|a, b| b.weight.cmp(&a.weight));
        sorted
    }

    /// Weights at or above `cutoff`, largest first, for display.
    pub fn displayable(&self, cutoff: Decimal) -> Vec<AssetWeight> {
        self.sorted_descending()
            .into_iter()
            .filter(|w| w.weight >= cutoff)
            .collect()
    }

    /// Herfindahl-Hirschman index: sum of squared weights.
    pub fn hhi(&self) -> Decimal {
        self.weights.iter().map(|w| w.weight * w.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PortfolioWeights {
        let names: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        PortfolioWeights::from_parts(&names, &[dec!(0.3), dec!(0.69999999), dec!(0.00000001)])
    }

    #[test]
    fn test_displayable_hides_noise_but_keeps_raw() {
        let w = sample();
        let shown: Vec<String> = w
            .displayable(DISPLAY_CUTOFF)
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(shown, vec!["B".to_string(), "A".to_string()]);
        assert_eq!(w.get("C"), Some(dec!(0.00000001)));
        assert_eq!(w.sum(), Decimal::ONE);
    }

    #[test]
    fn test_serializes_as_list() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["name"], "A");
    }
}
