use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::KStockError;
use crate::math::{quadratic_form, sqrt_decimal, validate_square_symmetric};
use crate::returns::{CorrelationMatrix, CovarianceMatrix};
use crate::types::{with_metadata, ComputationOutput};
use crate::KStockResult;

use super::clustering::{linkage, CondensedDistanceMatrix, LinkageMethod, Merge};
use super::weights::PortfolioWeights;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to Hierarchical Risk Parity allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrpInput {
    pub asset_names: Vec<String>,
    /// N x N covariance matrix (annualised).
    pub covariance_matrix: Vec<Vec<Decimal>>,
    /// N x N correlation matrix, same asset order as the covariance.
    pub correlation_matrix: Vec<Vec<Decimal>>,
    /// Linkage used for the tree; Ward when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkage: Option<LinkageMethod>,
}

impl HrpInput {
    /// Build from engine outputs. Both matrices must name the same assets in
    /// the same order.
    pub fn from_matrices(
        covariance: &CovarianceMatrix,
        correlation: &CorrelationMatrix,
    ) -> KStockResult<Self> {
        if covariance.names != correlation.names {
            return Err(KStockError::InvalidInput {
                field: "correlation_matrix".into(),
                reason: format!(
                    "asset names differ from covariance: [{}] vs [{}]",
                    correlation.names.join(", "),
                    covariance.names.join(", ")
                ),
            });
        }
        Ok(Self {
            asset_names: covariance.names.clone(),
            covariance_matrix: covariance.values.clone(),
            correlation_matrix: correlation.values.clone(),
            linkage: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrpOutput {
    /// Weights in input order.
    pub weights: PortfolioWeights,
    /// Asset names in quasi-diagonal (dendrogram leaf) order.
    pub order: Vec<String>,
    pub linkage: LinkageMethod,
    pub merges: Vec<Merge>,
    /// Portfolio variance w' * Sigma * w
    pub variance: Decimal,
    pub volatility: Decimal,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Allocate by Hierarchical Risk Parity: cluster on correlation distance,
/// order leaves quasi-diagonally, then split weight top-down in inverse
/// proportion to each half's variance.
pub fn allocate_hrp(input: &HrpInput) -> KStockResult<ComputationOutput<HrpOutput>> {
    let start = Instant::now();
    let n = input.asset_names.len();
    validate_input(input, n)?;

    let method = input.linkage.unwrap_or_default();
    let distances = correlation_distance(&input.correlation_matrix);
    // Rows of the distance matrix are treated as observations.
    let condensed = CondensedDistanceMatrix::from_observations(&distances)?;
    let tree = linkage(&condensed, method)?;
    let order = tree.pre_order();

    let w = recursive_bisection(&input.covariance_matrix, &order, &input.asset_names)?;
    let variance = quadratic_form(&w, &input.covariance_matrix);
    debug!("hrp over {} assets, leaf order {:?}", n, order);

    let output = HrpOutput {
        weights: PortfolioWeights::from_parts(&input.asset_names, &w),
        order: order.iter().map(|&i| input.asset_names[i].clone()).collect(),
        linkage: method,
        merges: tree.merges,
        variance,
        volatility: sqrt_decimal(variance),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Hierarchical Risk Parity (correlation-distance clustering, recursive bisection)",
        &serde_json::json!({
            "n_assets": n,
            "linkage": method.to_string(),
        }),
        Vec::new(),
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &HrpInput, n: usize) -> KStockResult<()> {
    if n == 0 {
        return Err(KStockError::DataInsufficiency(
            "HRP requires at least one asset".into(),
        ));
    }
    validate_square_symmetric("covariance_matrix", &input.covariance_matrix, n)?;
    validate_square_symmetric("correlation_matrix", &input.correlation_matrix, n)?;
    Ok(())
}

/// d(i,j) = sqrt((1 - rho) / 2)
fn correlation_distance(corr: &[Vec<Decimal>]) -> Vec<Vec<Decimal>> {
    let two = Decimal::from(2);
    corr.iter()
        .map(|row| {
            row.iter()
                .map(|rho| sqrt_decimal(((Decimal::ONE - *rho) / two).max(Decimal::ZERO)))
                .collect()
        })
        .collect()
}

/// Variance of a cluster held at inverse-variance weights.
fn cluster_variance(
    cov: &[Vec<Decimal>],
    members: &[usize],
    names: &[String],
) -> KStockResult<Decimal> {
    let mut inverse = Vec::with_capacity(members.len());
    for &i in members {
        let var = cov[i][i];
        if var <= Decimal::ZERO {
            return Err(KStockError::Allocation {
                asset: names[i].clone(),
                reason: format!("non-positive variance {}", var),
            });
        }
        inverse.push(Decimal::ONE / var);
    }
    let total: Decimal = inverse.iter().copied().sum();
    let w: Vec<Decimal> = inverse.iter().map(|v| *v / total).collect();
    let sub: Vec<Vec<Decimal>> = members
        .iter()
        .map(|&i| members.iter().map(|&j| cov[i][j]).collect())
        .collect();
    Ok(quadratic_form(&w, &sub))
}

/// Top-down split over the leaf order. An odd-sized cluster puts the extra
/// member on the right.
fn recursive_bisection(
    cov: &[Vec<Decimal>],
    order: &[usize],
    names: &[String],
) -> KStockResult<Vec<Decimal>> {
    let mut w = vec![Decimal::ONE; cov.len()];
    let mut pending: Vec<Vec<usize>> = vec![order.to_vec()];

    while let Some(cluster) = pending.pop() {
        if cluster.len() < 2 {
            // A single asset still has to carry a usable variance.
            if let Some(&i) = cluster.first() {
                cluster_variance(cov, &[i], names)?;
            }
            continue;
        }
        let (left, right) = cluster.split_at(cluster.len() / 2);
        let v_left = cluster_variance(cov, left, names)?;
        let v_right = cluster_variance(cov, right, names)?;
        let total = v_left + v_right;
        if total.is_zero() {
            return Err(KStockError::Allocation {
                asset: names[left[0]].clone(),
                reason: "combined cluster variance is zero".into(),
            });
        }
        let alpha = Decimal::ONE - v_left / total;
        for &i in left {
            w[i] *= alpha;
        }
        for &i in right {
            w[i] *= Decimal::ONE - alpha;
        }
        pending.push(right.to_vec());
        pending.push(left.to_vec());
    }
    Ok(w)
}
