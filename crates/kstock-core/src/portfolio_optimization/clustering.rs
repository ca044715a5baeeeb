//! Agglomerative hierarchical clustering over a condensed distance matrix.
//!
//! Linkage updates use the Lance–Williams recurrences. Ward works on squared
//! distances internally and reports merge heights as plain distances. Merge
//! records follow the usual linkage-matrix convention: leaves are `0..n`,
//! the cluster created by merge `k` is `n + k`, and the smaller id is always
//! the left child.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KStockError;
use crate::math::sqrt_decimal;
use crate::KStockResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkageMethod {
    Single,
    Complete,
    Average,
    #[default]
    Ward,
}

impl FromStr for LinkageMethod {
    type Err = KStockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(LinkageMethod::Single),
            "complete" => Ok(LinkageMethod::Complete),
            "average" => Ok(LinkageMethod::Average),
            "ward" => Ok(LinkageMethod::Ward),
            other => Err(KStockError::Configuration(format!(
                "unknown linkage method '{}'. Use: single, complete, average, ward",
                other
            ))),
        }
    }
}

impl fmt::Display for LinkageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkageMethod::Single => "single",
            LinkageMethod::Complete => "complete",
            LinkageMethod::Average => "average",
            LinkageMethod::Ward => "ward",
        };
        f.write_str(name)
    }
}

/// Upper triangle of a symmetric distance matrix, row by row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedDistanceMatrix {
    n: usize,
    values: Vec<Decimal>,
}

impl CondensedDistanceMatrix {
    /// Condense a square, symmetric, non-negative distance matrix.
    pub fn from_square(matrix: &[Vec<Decimal>]) -> KStockResult<Self> {
        let n = matrix.len();
        crate::math::validate_square_symmetric("distance_matrix", matrix, n)?;
        let mut values = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                if matrix[i][j] < Decimal::ZERO {
                    return Err(KStockError::InvalidInput {
                        field: "distance_matrix".into(),
                        reason: format!("negative distance at [{}][{}]", i, j),
                    });
                }
                values.push(matrix[i][j]);
            }
        }
        Ok(Self { n, values })
    }

    /// Pairwise Euclidean distances between observation vectors.
    pub fn from_observations(observations: &[Vec<Decimal>]) -> KStockResult<Self> {
        let n = observations.len();
        let dim = observations.first().map(|o| o.len()).unwrap_or(0);
        if let Some(k) = observations.iter().position(|o| o.len() != dim) {
            return Err(KStockError::InvalidInput {
                field: "observations".into(),
                reason: format!("row {} has {} values, expected {}", k, observations[k].len(), dim),
            });
        }
        let mut values = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                let sq: Decimal = observations[i]
                    .iter()
                    .zip(observations[j].iter())
                    .map(|(a, b)| (*a - *b) * (*a - *b))
                    .sum();
                values.push(sqrt_decimal(sq));
            }
        }
        Ok(Self { n, values })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> Decimal {
        if i == j {
            return Decimal::ZERO;
        }
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        self.values[self.n * i - i * (i + 1) / 2 + (j - i - 1)]
    }
}

/// One agglomeration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: Decimal,
    /// Number of leaves under the new cluster.
    pub size: usize,
}

/// Binary merge tree produced by [`linkage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dendrogram {
    pub n_leaves: usize,
    pub method: LinkageMethod,
    pub merges: Vec<Merge>,
}

impl Dendrogram {
    /// Leaf ids in pre-order (root, left subtree, right subtree).
    pub fn pre_order(&self) -> Vec<usize> {
        let n = self.n_leaves;
        if self.merges.is_empty() {
            return (0..n).collect();
        }
        let mut leaves = Vec::with_capacity(n);
        let mut stack = vec![n + self.merges.len() - 1];
        while let Some(node) = stack.pop() {
            if node < n {
                leaves.push(node);
            } else {
                let merge = &self.merges[node - n];
                stack.push(merge.right);
                stack.push(merge.left);
            }
        }
        leaves
    }
}

/// Cluster `distances` bottom-up. Ties go to the first pair in row-major
/// order, so identical inputs always give identical trees.
#[allow(clippy::needless_range_loop)]
pub fn linkage(
    distances: &CondensedDistanceMatrix,
    method: LinkageMethod,
) -> KStockResult<Dendrogram> {
    let n = distances.len();
    if n == 0 {
        return Err(KStockError::DataInsufficiency(
            "clustering requires at least one observation".into(),
        ));
    }

    // Working distances; Ward recurses on squared Euclidean distances.
    let mut d: Vec<Vec<Decimal>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let v = distances.get(i, j);
                    if method == LinkageMethod::Ward {
                        v * v
                    } else {
                        v
                    }
                })
                .collect()
        })
        .collect();
    let mut ids: Vec<usize> = (0..n).collect();
    let mut sizes: Vec<usize> = vec![1; n];
    let mut active: Vec<bool> = vec![true; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for step in 0..n.saturating_sub(1) {
        let mut best: Option<(usize, usize, Decimal)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                if best.map_or(true, |(_, _, b)| d[i][j] < b) {
                    best = Some((i, j, d[i][j]));
                }
            }
        }
        let (a, b, dist) = best.ok_or_else(|| {
            KStockError::DataInsufficiency("no clusters left to merge".into())
        })?;

        let (na, nb) = (Decimal::from(sizes[a] as i64), Decimal::from(sizes[b] as i64));
        for k in 0..n {
            if !active[k] || k == a || k == b {
                continue;
            }
            let nk = Decimal::from(sizes[k] as i64);
            let updated = match method {
                LinkageMethod::Single => d[a][k].min(d[b][k]),
                LinkageMethod::Complete => d[a][k].max(d[b][k]),
                LinkageMethod::Average => (na * d[a][k] + nb * d[b][k]) / (na + nb),
                LinkageMethod::Ward => {
                    ((na + nk) * d[a][k] + (nb + nk) * d[b][k] - nk * dist) / (na + nb + nk)
                }
            };
            d[a][k] = updated;
            d[k][a] = updated;
        }

        let height = if method == LinkageMethod::Ward {
            sqrt_decimal(dist)
        } else {
            dist
        };
        merges.push(Merge {
            left: ids[a].min(ids[b]),
            right: ids[a].max(ids[b]),
            distance: height,
            size: sizes[a] + sizes[b],
        });

        ids[a] = n + step;
        sizes[a] += sizes[b];
        active[b] = false;
    }

    Ok(Dendrogram {
        n_leaves: n,
        method,
        merges,
    })
}
