pub mod clustering;
pub mod hrp;
pub mod mean_variance;
pub mod weights;

pub use weights::{AssetWeight, PortfolioWeights, DISPLAY_CUTOFF};
