//! Linear least squares solver.
//!
//! Each Levenberg–Marquardt iteration solves a small damped system
//!
//! ```text
//! minimize || J δ - r ||² + λ Σ d_j δ_j²
//! ```
//!
//! which we express as an augmented tall system `[J; sqrt(λ D)] δ = [r; 0]`
//! and hand to an SVD solve. The parameter dimension is tiny (7–21 columns),
//! so SVD cost is negligible next to model evaluation.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Invert a symmetric positive (semi-)definite matrix such as `JᵀJ`.
///
/// Returns `None` when the matrix is singular or the inverse is not finite.
pub fn invert_normal_matrix(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if m.nrows() != m.ncols() || m.nrows() == 0 {
        return None;
    }
    let inv = match m.clone().cholesky() {
        Some(chol) => chol.inverse(),
        None => m.clone().try_inverse()?,
    };
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn singular_normal_matrix_has_no_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(invert_normal_matrix(&m).is_none());

        let m = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 2.0]);
        let inv = invert_normal_matrix(&m).unwrap();
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
        assert!((inv[(1, 1)] - 0.5).abs() < 1e-12);
    }
}
