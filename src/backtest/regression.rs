//! Ridge Regression Core
//!
//! Closed-form solve of `(XᵀX + λD)β = Xᵀy` where `D` is the identity with the intercept
//! entry zeroed. The system is factorized with Cholesky (`A = LLᵀ`), then solved by
//! forward substitution (`Lz = Xᵀy`) and back substitution (`Lᵀβ = z`).
//!
//! Diagonal pivots are floored at [`DIAGONAL_FLOOR`] before the square root so a
//! near-singular system still factorizes. No randomness, no iteration: identical inputs
//! give bit-identical coefficients.

use crate::backtest::features::Target;
use anyhow::{ensure, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

pub const DIAGONAL_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl Coefficients {
    pub fn predict(&self, features: &[f64]) -> f64 {
        debug_assert_eq!(features.len(), self.weights.len());
        self.intercept
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// Fit a ridge model. `lambda = 0` is ordinary least squares.
pub fn fit(features: &[Vec<f64>], targets: &[f64], lambda: f64) -> Result<Coefficients> {
    ensure!(!features.is_empty(), "cannot fit on an empty feature matrix");
    ensure!(
        features.len() == targets.len(),
        "feature rows ({}) and targets ({}) differ in length",
        features.len(),
        targets.len()
    );
    ensure!(
        lambda.is_finite() && lambda >= 0.0,
        "lambda must be finite and non-negative, got {}",
        lambda
    );

    let p = features[0].len();
    ensure!(
        features.iter().all(|row| row.len() == p),
        "feature rows have inconsistent widths"
    );

    let n = features.len();
    let k = p + 1;
    let x = DMatrix::from_fn(n, k, |i, j| if j == 0 { 1.0 } else { features[i][j - 1] });
    let y = DVector::from_column_slice(targets);

    let xt = x.transpose();
    let mut gram = &xt * &x;
    for j in 1..k {
        gram[(j, j)] += lambda;
    }
    let rhs = &xt * y;

    let beta = cholesky_solve(&gram, &rhs);
    Ok(Coefficients {
        intercept: beta[0],
        weights: beta.iter().skip(1).copied().collect(),
    })
}

pub fn predict(features: &[f64], coefficients: &Coefficients) -> f64 {
    coefficients.predict(features)
}

/// Solve `Aβ = b` for symmetric positive (semi-)definite `A`.
pub fn cholesky_solve(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    let k = a.nrows();
    let mut l = DMatrix::<f64>::zeros(k, k);

    for j in 0..k {
        let mut diag = a[(j, j)];
        for m in 0..j {
            diag -= l[(j, m)] * l[(j, m)];
        }
        let pivot = diag.max(DIAGONAL_FLOOR).sqrt();
        l[(j, j)] = pivot;

        for i in (j + 1)..k {
            let mut s = a[(i, j)];
            for m in 0..j {
                s -= l[(i, m)] * l[(j, m)];
            }
            l[(i, j)] = s / pivot;
        }
    }

    let mut z = DVector::<f64>::zeros(k);
    for i in 0..k {
        let mut s = b[i];
        for m in 0..i {
            s -= l[(i, m)] * z[m];
        }
        z[i] = s / l[(i, i)];
    }

    let mut beta = DVector::<f64>::zeros(k);
    for i in (0..k).rev() {
        let mut s = z[i];
        for m in (i + 1)..k {
            s -= l[(m, i)] * beta[m];
        }
        beta[i] = s / l[(i, i)];
    }

    beta
}

/// A model fitted for one walk-forward iteration. Discarded after its season is scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub target: Target,
    pub coefficients: Coefficients,
    pub lambda: f64,
    /// Exclusive upper bound on the seasons that contributed training rows
    pub trained_before_season: i32,
    pub training_rows: usize,
}

impl TrainedModel {
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.coefficients.predict(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn synthetic(n: usize, noise: f64, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let a: f64 = rng.gen_range(-5.0..5.0);
            let b: f64 = rng.gen_range(0.0..10.0);
            let e: f64 = rng.gen_range(-noise..=noise);
            x.push(vec![a, b]);
            y.push(2.0 + 3.0 * a - 1.0 * b + e);
        }
        (x, y)
    }

    #[test]
    fn test_ols_recovers_exact_linear_relationship() {
        let (x, y) = synthetic(200, 0.0, 7);
        let c = fit(&x, &y, 0.0).unwrap();
        assert!((c.intercept - 2.0).abs() < 1e-6, "intercept {}", c.intercept);
        assert!((c.weights[0] - 3.0).abs() < 1e-6);
        assert!((c.weights[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ols_matches_closed_form_solution() {
        let (x, y) = synthetic(500, 1.5, 11);
        let c = fit(&x, &y, 0.0).unwrap();

        let n = x.len();
        let design = DMatrix::from_fn(n, 3, |i, j| if j == 0 { 1.0 } else { x[i][j - 1] });
        let target = DVector::from_column_slice(&y);
        let gram = design.transpose() * &design;
        let rhs = design.transpose() * target;
        let expected = gram.lu().solve(&rhs).unwrap();

        assert!((c.intercept - expected[0]).abs() < 1e-8);
        assert!((c.weights[0] - expected[1]).abs() < 1e-8);
        assert!((c.weights[1] - expected[2]).abs() < 1e-8);
    }

    #[test]
    fn test_ridge_shrinks_weights_but_not_intercept() {
        let (x, y) = synthetic(300, 1.0, 3);
        let ols = fit(&x, &y, 0.0).unwrap();
        let ridge = fit(&x, &y, 50.0).unwrap();
        let norm = |c: &Coefficients| c.weights.iter().map(|w| w * w).sum::<f64>();
        assert!(norm(&ridge) < norm(&ols));

        // With an enormous penalty the weights vanish and the intercept tends to mean(y)
        let flat = fit(&x, &y, 1e12).unwrap();
        let mean_y = y.iter().sum::<f64>() / y.len() as f64;
        assert!(flat.weights.iter().all(|w| w.abs() < 1e-3));
        assert!((flat.intercept - mean_y).abs() < 1e-2);
    }

    #[test]
    fn test_collinear_features_do_not_fail() {
        let (x, y) = synthetic(100, 0.5, 5);
        // Third column duplicates the first
        let x: Vec<Vec<f64>> = x.into_iter().map(|r| vec![r[0], r[1], r[0]]).collect();

        let unregularized = fit(&x, &y, 0.0).unwrap();
        assert!(unregularized.intercept.is_finite());
        assert!(unregularized.weights.iter().all(|w| w.is_finite()));

        let ridge = fit(&x, &y, 1.0).unwrap();
        // Weight is shared across the duplicated column
        assert!((ridge.weights[0] + ridge.weights[2] - 3.0).abs() < 0.1);
        assert!((ridge.weights[0] - ridge.weights[2]).abs() < 1e-6);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = synthetic(250, 2.0, 9);
        let a = fit(&x, &y, 0.5).unwrap();
        let b = fit(&x, &y, 0.5).unwrap();
        assert_eq!(a.intercept.to_bits(), b.intercept.to_bits());
        for (wa, wb) in a.weights.iter().zip(&b.weights) {
            assert_eq!(wa.to_bits(), wb.to_bits());
        }
    }

    #[test]
    fn test_fit_rejects_bad_shapes() {
        assert!(fit(&[], &[], 0.0).is_err());
        assert!(fit(&[vec![1.0]], &[1.0, 2.0], 0.0).is_err());
        assert!(fit(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0], 0.0).is_err());
        assert!(fit(&[vec![1.0]], &[1.0], -1.0).is_err());
    }

    #[test]
    fn test_predict_applies_intercept() {
        let c = Coefficients {
            intercept: 150.0,
            weights: vec![0.5, -0.3],
        };
        assert!((predict(&[200.0, 100.0], &c) - 220.0).abs() < 1e-12);
    }
}
