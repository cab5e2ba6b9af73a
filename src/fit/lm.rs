//! Bounded Levenberg–Marquardt least squares.
//!
//! Minimizes `Σ r_i(x)²` for a residual function `r` (already divided by the
//! per-point uncertainties). The Jacobian is a forward difference (backward at
//! an upper bound), steps are projected onto the box bounds, and damping is
//! Marquardt's: the diagonal of `JᵀJ` is scaled by `1 + λ`. λ shrinks by
//! `lambda_down` after an accepted step and grows by `lambda_up` after a
//! rejected one.
//!
//! The covariance follows the usual `leastsq` convention:
//! `cov = (JᵀJ)⁻¹ · Σr² / (n - p)`, and is `None` when `JᵀJ` is singular or
//! there are no degrees of freedom left.

use nalgebra::{DMatrix, DVector};

use crate::math::{invert_normal_matrix, solve_least_squares};

/// Stopping criteria.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmOptions {
    pub max_iter: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor applied to λ after a rejected step.
    pub lambda_up: f64,
    /// Factor applied to λ after an accepted step.
    pub lambda_down: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 0.0,
            initial_lambda: 0.001,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

impl LmOptions {
    pub fn with_max_iter(max_iter: usize) -> Self {
        Self {
            max_iter,
            ..Self::default()
        }
    }
}

/// Result of one optimizer run.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    pub covariance: Option<DMatrix<f64>>,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
}

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e10;
const DIFF_STEP: f64 = 1.490_116_119_384_765_6e-8;

/// Run the optimizer from `x0` with per-parameter bounds `lower`/`upper`.
pub fn levenberg_marquardt<F>(
    residuals: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    opts: &LmOptions,
) -> LmOutcome
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let p = x0.len();
    let mut x: Vec<f64> = project(x0, lower, upper);
    let mut r = residuals(&x);
    let mut cost = sum_sq(&r);

    if !cost.is_finite() {
        return LmOutcome {
            params: x,
            cost,
            covariance: None,
            iterations: 0,
            converged: false,
            message: "initial residuals are not finite".to_string(),
        };
    }
    if p == 0 || r.is_empty() {
        return LmOutcome {
            covariance: None,
            params: x,
            cost,
            iterations: 0,
            converged: false,
            message: "nothing to fit".to_string(),
        };
    }

    let mut lambda = opts.initial_lambda;
    let mut converged = false;
    let mut message = format!("number of iterations reached maxiter={}", opts.max_iter);
    let mut iterations = 0;

    'outer: for iter in 0..opts.max_iter {
        iterations = iter + 1;
        let jac = jacobian(&residuals, &x, &r, lower, upper);
        let rvec = DVector::from_column_slice(&r);
        let grad = jac.transpose() * &rvec;

        let gnorm = grad.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
        if gnorm <= opts.gtol.max(f64::EPSILON) * cost.max(f64::MIN_POSITIVE) {
            converged = true;
            message = "gradient is orthogonal to the residuals to machine precision".to_string();
            break;
        }

        let jtj = jac.transpose() * &jac;
        let n = r.len();

        loop {
            let mut a = DMatrix::<f64>::zeros(n + p, p);
            let mut b = DVector::<f64>::zeros(n + p);
            a.view_mut((0, 0), (n, p)).copy_from(&jac);
            for i in 0..n {
                b[i] = -r[i];
            }
            // The augmented rows make the normal matrix JᵀJ + λ·diag(JᵀJ).
            for j in 0..p {
                a[(n + j, j)] = (lambda * jtj[(j, j)].max(1e-12)).sqrt();
            }

            let step = solve_least_squares(&a, &b);
            let trial = step.map(|delta| {
                let moved: Vec<f64> = x.iter().zip(delta.iter()).map(|(xi, di)| xi + di).collect();
                project(&moved, lower, upper)
            });

            if let Some(x_new) = trial {
                let r_new = residuals(&x_new);
                let cost_new = sum_sq(&r_new);
                if cost_new.is_finite() && cost_new < cost {
                    let dx = norm(&x_new.iter().zip(&x).map(|(a, b)| a - b).collect::<Vec<_>>());
                    let xnorm = norm(&x);
                    let reduction = cost - cost_new;

                    x = x_new;
                    r = r_new;
                    let prev_cost = cost;
                    cost = cost_new;
                    lambda = (lambda * opts.lambda_down).max(LAMBDA_MIN);

                    if reduction <= opts.ftol * prev_cost {
                        converged = true;
                        message = "relative reduction in the sum of squares is at most ftol".to_string();
                        break 'outer;
                    }
                    if dx <= opts.xtol * (xnorm + opts.xtol) {
                        converged = true;
                        message = "relative error between two consecutive iterates is at most xtol".to_string();
                        break 'outer;
                    }
                    break;
                }
            }

            lambda *= opts.lambda_up;
            if lambda > LAMBDA_MAX {
                converged = true;
                message = "damping limit reached without reducing the sum of squares".to_string();
                break 'outer;
            }
        }
    }

    let covariance = covariance_at(&residuals, &x, &r, lower, upper, cost);

    LmOutcome {
        params: x,
        cost,
        covariance,
        iterations,
        converged,
        message,
    }
}

fn covariance_at<F>(
    residuals: &F,
    x: &[f64],
    r: &[f64],
    lower: &[f64],
    upper: &[f64],
    cost: f64,
) -> Option<DMatrix<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = r.len();
    let p = x.len();
    if n <= p {
        return None;
    }
    let jac = jacobian(residuals, x, r, lower, upper);
    let jtj = jac.transpose() * &jac;
    let cov_x = invert_normal_matrix(&jtj)?;
    Some(cov_x * (cost / (n - p) as f64))
}

fn jacobian<F>(residuals: &F, x: &[f64], r: &[f64], lower: &[f64], upper: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = r.len();
    let p = x.len();
    let mut jac = DMatrix::<f64>::zeros(n, p);
    let mut shifted = x.to_vec();

    for j in 0..p {
        let mut h = DIFF_STEP * x[j].abs();
        if h == 0.0 {
            h = DIFF_STEP;
        }
        // Step away from an upper bound rather than through it.
        if x[j] + h > upper[j] {
            h = -h;
        }
        shifted[j] = x[j] + h;
        if shifted[j] < lower[j] {
            shifted[j] = lower[j];
        }
        let dh = shifted[j] - x[j];
        if dh != 0.0 {
            let r_h = residuals(&shifted);
            for i in 0..n {
                jac[(i, j)] = (r_h[i] - r[i]) / dh;
            }
        }
        shifted[j] = x[j];
    }
    jac
}

fn project(x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.max(lo).min(hi))
        .collect()
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn norm(v: &[f64]) -> f64 {
    sum_sq(v).sqrt()
}
