//! Covariance estimation and Cholesky factorization.
//!
//! Matrices are small (one row per held asset) and stored as `Vec<Vec<f64>>`.

use tracing::warn;

use crate::stats::mean;
use crate::error::RiskEngineError;
use crate::RiskEngineResult;

pub type Matrix = Vec<Vec<f64>>;

/// Lower-triangular factor `L` with `L·Lᵀ = Σ`.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    pub lower: Matrix,
    /// True when the diagonal was regularized before factorizing
    pub regularized: bool,
}

/// Sample covariance (n - 1 denominator) of equal-length return columns.
pub fn sample_covariance(columns: &[Vec<f64>]) -> Matrix {
    let k = columns.len();
    let n = columns.first().map_or(0, Vec::len);
    let means: Vec<f64> = columns.iter().map(|c| mean(c)).collect();
    let mut cov = vec![vec![0.0; k]; k];
    if n < 2 {
        return cov;
    }
    for i in 0..k {
        for j in 0..=i {
            let s: f64 = columns[i]
                .iter()
                .zip(&columns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum();
            let c = s / (n - 1) as f64;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    cov
}

/// Mean of the off-diagonal correlations; `None` for fewer than two assets.
pub fn average_correlation(cov: &Matrix) -> Option<f64> {
    let k = cov.len();
    if k < 2 {
        return None;
    }
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..k {
        for j in (i + 1)..k {
            let denom = (cov[i][i] * cov[j][j]).sqrt();
            if denom > 0.0 {
                sum += cov[i][j] / denom;
            }
            pairs += 1;
        }
    }
    Some(sum / pairs as f64)
}

/// `wᵀ Σ w`
pub fn quadratic_form(weights: &[f64], cov: &Matrix) -> f64 {
    mat_vec(cov, weights)
        .iter()
        .zip(weights)
        .map(|(sw, w)| sw * w)
        .sum()
}

/// `Σ w`
pub fn mat_vec(matrix: &Matrix, v: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

/// Cholesky–Banachiewicz factorization.
///
/// Returns the index of the first non-positive pivot on failure.
pub fn cholesky(matrix: &Matrix) -> Result<Matrix, usize> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let pivot = matrix[i][i] - sum;
                if !(pivot.is_finite() && pivot > 0.0) {
                    return Err(i);
                }
                l[i][j] = pivot.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }
    Ok(l)
}

/// Factorize, retrying once with `epsilon` added to the diagonal.
pub fn cholesky_regularized(cov: &Matrix, epsilon: f64) -> RiskEngineResult<CholeskyFactor> {
    match cholesky(cov) {
        Ok(lower) => Ok(CholeskyFactor {
            lower,
            regularized: false,
        }),
        Err(pivot) => {
            warn!(
                dimension = cov.len(),
                pivot, epsilon, "covariance not positive definite; regularizing diagonal"
            );
            let mut bumped = cov.clone();
            for (i, row) in bumped.iter_mut().enumerate() {
                row[i] += epsilon;
            }
            cholesky(&bumped)
                .map(|lower| CholeskyFactor {
                    lower,
                    regularized: true,
                })
                .map_err(|pivot| RiskEngineError::NonPositiveDefiniteCovariance {
                    dimension: cov.len(),
                    pivot,
                    regularized: true,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reconstruct(l: &Matrix) -> Matrix {
        let n = l.len();
        let mut out = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                out[i][j] = (0..n).map(|k| l[i][k] * l[j][k]).sum();
            }
        }
        out
    }

    #[test]
    fn test_cholesky_reconstructs_matrix() {
        let cov = vec![
            vec![0.04, 0.006, 0.002],
            vec![0.006, 0.09, 0.009],
            vec![0.002, 0.009, 0.0225],
        ];
        let l = cholesky(&cov).unwrap();
        assert_eq!(l[0][1], 0.0);
        assert_eq!(l[0][2], 0.0);
        assert_eq!(l[1][2], 0.0);
        let back = reconstruct(&l);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(back[i][j], cov[i][j], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_singular_covariance_is_regularized() {
        // A flat price series has zero variance, so the second pivot is exactly zero
        let cols = vec![vec![0.01, -0.02, 0.015, 0.0], vec![0.0; 4]];
        let cov = sample_covariance(&cols);
        assert!(cholesky(&cov).is_err());
        let factor = cholesky_regularized(&cov, 1e-8).unwrap();
        assert!(factor.regularized);
    }

    #[test]
    fn test_indefinite_matrix_surfaces_error_after_retry() {
        let cov = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        match cholesky_regularized(&cov, 1e-8) {
            Err(RiskEngineError::NonPositiveDefiniteCovariance {
                dimension,
                pivot,
                regularized,
            }) => {
                assert_eq!(dimension, 2);
                assert_eq!(pivot, 1);
                assert!(regularized);
            }
            other => panic!("expected NonPositiveDefiniteCovariance, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_covariance_and_correlation() {
        let a = vec![0.01, 0.02, 0.03, 0.04];
        let b: Vec<f64> = a.iter().map(|x| -2.0 * x).collect();
        let cov = sample_covariance(&[a, b]);
        assert_relative_eq!(cov[1][1], 4.0 * cov[0][0], epsilon = 1e-15);
        assert_relative_eq!(average_correlation(&cov).unwrap(), -1.0, epsilon = 1e-12);
        assert!(average_correlation(&vec![vec![1.0]]).is_none());
    }

    #[test]
    fn test_quadratic_form() {
        let cov = vec![vec![0.04, 0.01], vec![0.01, 0.09]];
        let w = [0.5, 0.5];
        // 0.25 * (0.04 + 0.09 + 2 * 0.01)
        assert_relative_eq!(quadratic_form(&w, &cov), 0.0375, epsilon = 1e-15);
    }
}
