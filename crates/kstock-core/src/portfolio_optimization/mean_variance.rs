use log::{debug, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::KStockError;
use crate::math::{
    mat_vec_multiply, mean, quadratic_form, solve_linear_system, sqrt_decimal,
    validate_square_symmetric, vec_dot,
};
use crate::types::{with_metadata, ComputationOutput};
use crate::KStockResult;

use super::weights::PortfolioWeights;

/// Per-asset weight cap applied once a portfolio is large enough to
/// diversify.
pub const CONCENTRATION_CAP: Decimal = dec!(0.2);

/// Smallest portfolio size at which [`CONCENTRATION_CAP`] applies.
pub const CAP_MIN_ASSETS: usize = 5;

const DEFAULT_TOLERANCE: Decimal = dec!(0.000000000001);
const DEFAULT_MAX_ITERATIONS: u32 = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to mean-variance portfolio optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceInput {
    /// Asset identifiers.
    pub asset_names: Vec<String>,
    /// Annualized expected returns per asset.
    pub expected_returns: Vec<Decimal>,
    /// N x N annualized covariance matrix.
    pub covariance_matrix: Vec<Vec<Decimal>>,
    /// Per-asset upper bound. Defaults to 0.2 for five or more assets and
    /// to no cap below that.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight: Option<Decimal>,
    /// Tolerance on steps and bound multipliers (default 1e-12).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Decimal>,
    /// Active-set iteration limit before reporting non-convergence
    /// (default 10000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

/// Output of mean-variance optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceOutput {
    /// Raw solver weights, in input order.
    pub weights: PortfolioWeights,
    /// w' * mu
    pub expected_return: Decimal,
    /// w' * Sigma * w
    pub variance: Decimal,
    pub volatility: Decimal,
    /// expected_return - variance, the maximised quantity.
    pub objective: Decimal,
    /// Cap applied to every weight.
    pub max_weight: Decimal,
    pub iterations: u32,
    /// Herfindahl-Hirschman index of weights.
    pub hhi_concentration: Decimal,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Maximise `mu'w - w'Sigma w` subject to `sum(w) = 1`, `0 <= w <= cap`.
///
/// The problem is a convex QP. It is solved exactly by an active-set method,
/// so near-collinear assets cost no more iterations than independent ones.
pub fn optimize_mean_variance(
    input: &MeanVarianceInput,
) -> KStockResult<ComputationOutput<MeanVarianceOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.asset_names.len();
    validate_input(input, n)?;

    let cap = input.max_weight.unwrap_or(if n >= CAP_MIN_ASSETS {
        CONCENTRATION_CAP
    } else {
        Decimal::ONE
    });
    let tolerance = input.tolerance.unwrap_or(DEFAULT_TOLERANCE);
    let max_iterations = input.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);

    let sigma = &input.covariance_matrix;
    let mu = &input.expected_returns;
    let (w, iterations) = solve_capped_simplex_qp(mu, sigma, cap, tolerance, max_iterations)?;

    let expected_return = vec_dot(&w, mu);
    let variance = quadratic_form(&w, sigma);
    let weights = PortfolioWeights::from_parts(&input.asset_names, &w);
    let hhi_concentration = weights.hhi();

    for aw in &weights.weights {
        if aw.weight > dec!(0.40) {
            warn!("concentrated position: {} at {:.4}", aw.name, aw.weight);
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                aw.name, aw.weight
            ));
        }
    }

    let output = MeanVarianceOutput {
        weights,
        expected_return,
        variance,
        volatility: sqrt_decimal(variance),
        objective: expected_return - variance,
        max_weight: cap,
        iterations,
        hhi_concentration,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-Variance Optimization (max mu'w - w'Sigma w, long-only, capped)",
        &serde_json::json!({
            "n_assets": n,
            "max_weight": cap.to_string(),
            "tolerance": tolerance.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

/// Added to the Hessian diagonal when a free block is singular, e.g. two
/// assets with identical return series.
const SINGULAR_RIDGE: Decimal = dec!(0.000000000001);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Free,
    Lower,
    Upper,
}

/// Primal active-set method on the capped simplex.
///
/// Each iteration solves the KKT system of the equality-constrained problem
/// over the free assets exactly, then either steps to that point or stops at
/// the first bound in the way. At a full step the bound multipliers decide
/// between optimality and releasing the most violated bound. The warm start
/// is one projected gradient step from equal weights.
fn solve_capped_simplex_qp(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    cap: Decimal,
    tolerance: Decimal,
    max_iterations: u32,
) -> KStockResult<(Vec<Decimal>, u32)> {
    let n = mu.len();
    if cap * Decimal::from(n as i64) <= Decimal::ONE {
        // Equal weights at the cap is the only feasible point.
        return Ok((vec![cap; n], 0));
    }

    let mut hessian: Vec<Vec<Decimal>> = sigma
        .iter()
        .map(|row| row.iter().map(|v| *v * dec!(2)).collect())
        .collect();
    let mut ridge_applied = false;

    let mut w = warm_start(mu, &hessian, cap);
    let mut bounds: Vec<Bound> = w
        .iter()
        .map(|wi| if wi.is_zero() { Bound::Lower } else { Bound::Free })
        .collect();

    for iteration in 1..=max_iterations {
        let free: Vec<usize> = (0..n).filter(|&i| bounds[i] == Bound::Free).collect();
        if free.is_empty() {
            return Ok((clamp_weights(w, cap), iteration));
        }

        let target = match solve_free_block(mu, &hessian, cap, &bounds, &free) {
            Ok(target) => target,
            Err(KStockError::DivisionByZero { .. }) if !ridge_applied => {
                debug!("singular free block, adding ridge {}", SINGULAR_RIDGE);
                for (i, row) in hessian.iter_mut().enumerate() {
                    row[i] += SINGULAR_RIDGE;
                }
                ridge_applied = true;
                continue;
            }
            Err(e) => {
                return Err(KStockError::Optimization {
                    reason: format!("KKT system could not be solved: {}", e),
                    iterations: iteration,
                })
            }
        };

        let mut alpha = Decimal::ONE;
        let mut blocking: Option<(usize, Bound)> = None;
        let step: Vec<Decimal> = free
            .iter()
            .zip(target.iter())
            .map(|(&i, t)| *t - w[i])
            .collect();
        for (&i, p) in free.iter().zip(step.iter()) {
            if p.abs() <= tolerance {
                continue;
            }
            let (limit, bound) = if *p < Decimal::ZERO {
                (-w[i] / *p, Bound::Lower)
            } else {
                ((cap - w[i]) / *p, Bound::Upper)
            };
            let limit = limit.max(Decimal::ZERO);
            if limit < alpha {
                alpha = limit;
                blocking = Some((i, bound));
            }
        }
        for (&i, p) in free.iter().zip(step.iter()) {
            w[i] += alpha * *p;
        }

        if let Some((i, bound)) = blocking {
            w[i] = if bound == Bound::Lower { Decimal::ZERO } else { cap };
            bounds[i] = bound;
            continue;
        }

        let gradient: Vec<Decimal> = mat_vec_multiply(&hessian, &w)
            .iter()
            .zip(mu.iter())
            .map(|(hw, m)| *hw - *m)
            .collect();
        let free_gradient: Vec<Decimal> = free.iter().map(|&i| gradient[i]).collect();
        let nu = -mean(&free_gradient);

        let mut most_violated: Option<(usize, Decimal)> = None;
        for (i, bound) in bounds.iter().enumerate() {
            let multiplier = match bound {
                Bound::Free => continue,
                Bound::Lower => gradient[i] + nu,
                Bound::Upper => -(gradient[i] + nu),
            };
            if multiplier < -tolerance
                && most_violated.map_or(true, |(_, worst)| multiplier < worst)
            {
                most_violated = Some((i, multiplier));
            }
        }
        match most_violated {
            None => {
                debug!("mean-variance optimal after {} active-set iterations", iteration);
                return Ok((clamp_weights(w, cap), iteration));
            }
            Some((i, _)) => bounds[i] = Bound::Free,
        }
    }

    Err(KStockError::Optimization {
        reason: format!("active set did not settle at tolerance {}", tolerance),
        iterations: max_iterations,
    })
}

/// Minimiser of the objective over the free assets with every bound asset
/// held at its bound: `H_FF w_F + nu = mu_F - H_FU cap`, `sum(w_F) = 1 - |U| cap`.
fn solve_free_block(
    mu: &[Decimal],
    hessian: &[Vec<Decimal>],
    cap: Decimal,
    bounds: &[Bound],
    free: &[usize],
) -> KStockResult<Vec<Decimal>> {
    let k = free.len();
    let upper: Vec<usize> = (0..bounds.len())
        .filter(|&j| bounds[j] == Bound::Upper)
        .collect();

    let mut system: Vec<Vec<Decimal>> = Vec::with_capacity(k + 1);
    let mut rhs: Vec<Decimal> = Vec::with_capacity(k + 1);
    for &i in free {
        let mut row: Vec<Decimal> = free.iter().map(|&j| hessian[i][j]).collect();
        row.push(Decimal::ONE);
        system.push(row);
        let held: Decimal = upper.iter().map(|&j| hessian[i][j] * cap).sum();
        rhs.push(mu[i] - held);
    }
    let mut budget_row = vec![Decimal::ONE; k];
    budget_row.push(Decimal::ZERO);
    system.push(budget_row);
    rhs.push(Decimal::ONE - cap * Decimal::from(upper.len() as i64));

    let mut solution = solve_linear_system(&system, &rhs)?;
    solution.truncate(k);
    Ok(solution)
}

/// One projected gradient step from equal weights, step size 1/L with L a
/// Gershgorin bound on the Hessian.
fn warm_start(mu: &[Decimal], hessian: &[Vec<Decimal>], cap: Decimal) -> Vec<Decimal> {
    let n = mu.len();
    let equal = vec![Decimal::ONE / Decimal::from(n as i64); n];
    let lipschitz: Decimal = hessian
        .iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<Decimal>())
        .max()
        .unwrap_or(Decimal::ZERO);
    if lipschitz.is_zero() {
        return project_capped_simplex(&equal, cap);
    }
    let h_w = mat_vec_multiply(hessian, &equal);
    let ascent: Vec<Decimal> = equal
        .iter()
        .zip(mu.iter().zip(h_w.iter()))
        .map(|(wi, (mi, hi))| *wi + (*mi - *hi) / lipschitz)
        .collect();
    project_capped_simplex(&ascent, cap)
}

fn clamp_weights(w: Vec<Decimal>, cap: Decimal) -> Vec<Decimal> {
    w.into_iter()
        .map(|wi| wi.max(Decimal::ZERO).min(cap))
        .collect()
}

/// Euclidean projection of `v` onto { w : sum(w) = 1, 0 <= w_i <= cap }.
///
/// The projection is `clamp(v_i - tau, 0, cap)` for the unique `tau` making
/// the sum one. The sum is piecewise linear and non-increasing in `tau` with
/// kinks at `v_i` and `v_i - cap`, so `tau` is found exactly by walking the
/// sorted kinks. Requires `n * cap >= 1`.
fn project_capped_simplex(v: &[Decimal], cap: Decimal) -> Vec<Decimal> {
    let clamped_sum = |tau: Decimal| -> Decimal {
        v.iter()
            .map(|x| (*x - tau).max(Decimal::ZERO).min(cap))
            .sum()
    };

    let mut kinks: Vec<Decimal> = v.iter().flat_map(|x| [*x - cap, *x]).collect();
    kinks.sort();
    kinks.dedup();

    let mut tau = kinks[0];
    let mut prev = kinks[0];
    let mut prev_sum = clamped_sum(prev);
    if prev_sum > Decimal::ONE {
        for &kink in &kinks[1..] {
            let sum = clamped_sum(kink);
            if sum <= Decimal::ONE {
                tau = if prev_sum == sum {
                    kink
                } else {
                    prev + (prev_sum - Decimal::ONE) * (kink - prev) / (prev_sum - sum)
                };
                break;
            }
            prev = kink;
            prev_sum = sum;
        }
    }

    v.iter()
        .map(|x| (*x - tau).max(Decimal::ZERO).min(cap))
        .collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_input(input: &MeanVarianceInput, n: usize) -> KStockResult<()> {
    if n == 0 {
        return Err(KStockError::Optimization {
            reason: "infeasible: no assets to allocate".into(),
            iterations: 0,
        });
    }
    if input.expected_returns.len() != n {
        return Err(KStockError::InvalidInput {
            field: "expected_returns".into(),
            reason: format!(
                "Expected {} returns but got {}",
                n,
                input.expected_returns.len()
            ),
        });
    }
    validate_square_symmetric("covariance_matrix", &input.covariance_matrix, n)?;
    for i in 0..n {
        if input.covariance_matrix[i][i] < Decimal::ZERO {
            return Err(KStockError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Negative variance for {}", input.asset_names[i]),
            });
        }
    }
    if let Some(cap) = input.max_weight {
        if cap <= Decimal::ZERO || cap > Decimal::ONE {
            return Err(KStockError::InvalidInput {
                field: "max_weight".into(),
                reason: "Must be in (0, 1]".into(),
            });
        }
        if cap * Decimal::from(n as i64) < Decimal::ONE {
            return Err(KStockError::Optimization {
                reason: format!("infeasible: {} assets capped at {} cannot sum to 1", n, cap),
                iterations: 0,
            });
        }
    }
    if let Some(tol) = input.tolerance {
        if tol <= Decimal::ZERO {
            return Err(KStockError::InvalidInput {
                field: "tolerance".into(),
                reason: "Must be positive".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
