//! Small Decimal matrix helpers shared by the analytics modules.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::KStockError;
use crate::KStockResult;

/// Matrix-vector multiplication: result_i = sum_j(mat[i][j] * vec[j]).
pub(crate) fn mat_vec_multiply(mat: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product of two vectors.
pub(crate) fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| *x * *y).sum()
}

/// Quadratic form: w' * M * w.
pub(crate) fn quadratic_form(w: &[Decimal], mat: &[Vec<Decimal>]) -> Decimal {
    vec_dot(w, &mat_vec_multiply(mat, w))
}

/// Square root; non-positive input maps to zero.
pub(crate) fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    val.sqrt().unwrap_or(Decimal::ZERO)
}

/// Arithmetic mean; zero for an empty slice.
pub(crate) fn mean(data: &[Decimal]) -> Decimal {
    if data.is_empty() {
        return Decimal::ZERO;
    }
    data.iter().sum::<Decimal>() / Decimal::from(data.len() as i64)
}

/// Sample covariance (n-1 denominator) of two equally long series.
pub(crate) fn sample_covariance(x: &[Decimal], y: &[Decimal]) -> Decimal {
    let n = x.len().min(y.len());
    if n < 2 {
        return Decimal::ZERO;
    }
    let x_mean = mean(&x[..n]);
    let y_mean = mean(&y[..n]);
    let sum: Decimal = x
        .iter()
        .zip(y.iter())
        .map(|(xi, yi)| (xi - x_mean) * (yi - y_mean))
        .sum();
    sum / Decimal::from((n - 1) as i64)
}

/// Pivots at or below this magnitude mark a singular system.
const SINGULAR_PIVOT: Decimal = dec!(0.000000000000000001);

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve_linear_system(
    a: &[Vec<Decimal>],
    b: &[Decimal],
) -> KStockResult<Vec<Decimal>> {
    let n = a.len();
    let mut aug: Vec<Vec<Decimal>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(*rhs);
            r
        })
        .collect();

    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if aug[row][col].abs() > aug[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        if aug[pivot_row][col].abs() <= SINGULAR_PIVOT {
            return Err(KStockError::DivisionByZero {
                context: format!("singular linear system at column {}", col),
            });
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }
        let pivot_values = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor.is_zero() {
                continue;
            }
            for (cell, p) in aug[row].iter_mut().zip(pivot_values.iter()) {
                *cell -= factor * *p;
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[n]).collect())
}

/// Check that `mat` is an n x n symmetric matrix.
#[allow(clippy::needless_range_loop)]
pub(crate) fn validate_square_symmetric(
    field: &str,
    mat: &[Vec<Decimal>],
    n: usize,
) -> KStockResult<()> {
    if mat.len() != n {
        return Err(KStockError::InvalidInput {
            field: field.into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, mat.len()),
        });
    }
    for (i, row) in mat.iter().enumerate() {
        if row.len() != n {
            return Err(KStockError::InvalidInput {
                field: field.into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
    }
    let tolerance = dec!(0.0000001);
    for i in 0..n {
        for j in (i + 1)..n {
            if (mat[i][j] - mat[j][i]).abs() > tolerance {
                return Err(KStockError::InvalidInput {
                    field: field.into(),
                    reason: format!(
                        "Matrix is not symmetric: [{}][{}]={} != [{}][{}]={}",
                        i, j, mat[i][j], j, i, mat[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_covariance_matches_hand_computation() {
        let x = vec![dec!(1), dec!(2), dec!(3)];
        let y = vec![dec!(2), dec!(4), dec!(6)];
        // means 2 and 4; sum of products (-1*-2)+(0)+(1*2)=4; /2
        assert_eq!(sample_covariance(&x, &y), dec!(2));
    }

    #[test]
    fn test_quadratic_form() {
        let m = vec![vec![dec!(2), dec!(0)], vec![dec!(0), dec!(3)]];
        assert_eq!(quadratic_form(&[dec!(1), dec!(1)], &m), dec!(5));
    }

    #[test]
    fn test_linear_system_with_pivoting() {
        // Zero leading entry forces a row swap.
        let a = vec![
            vec![dec!(0), dec!(1), dec!(1)],
            vec![dec!(2), dec!(1), dec!(0)],
            vec![dec!(1), dec!(0), dec!(3)],
        ];
        let x = solve_linear_system(&a, &[dec!(5), dec!(4), dec!(10)]).unwrap();
        for (got, want) in x.iter().zip([dec!(1), dec!(2), dec!(3)]) {
            assert!((*got - want).abs() < dec!(0.0000000000001), "{} != {}", got, want);
        }
    }

    #[test]
    fn test_singular_system_rejected() {
        let a = vec![vec![dec!(1), dec!(2)], vec![dec!(2), dec!(4)]];
        assert!(matches!(
            solve_linear_system(&a, &[dec!(1), dec!(2)]),
            Err(KStockError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_asymmetric_matrix_rejected() {
        let m = vec![vec![dec!(1), dec!(0.5)], vec![dec!(0.4), dec!(1)]];
        assert!(validate_square_symmetric("m", &m, 2).is_err());
        assert!(validate_square_symmetric("m", &m, 3).is_err());
    }
}
