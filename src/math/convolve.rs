//! 1D Gaussian smoothing of radial profiles.
//!
//! The kernel is sampled at integer offsets from its center, spans
//! `8σ` rounded up to the next odd integer, and is normalized to unit sum.
//! Samples beyond either edge take the nearest edge value ("extend" boundary),
//! so a flat profile stays flat after smoothing.

/// Build a normalized, odd-length Gaussian kernel for the given `sigma`.
///
/// Returns a single-tap identity kernel for non-positive or non-finite sigma.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return vec![1.0];
    }
    let width = round_up_to_odd(8.0 * sigma);
    let half = (width / 2) as i64;

    let mut kernel: Vec<f64> = (-half..=half)
        .map(|k| {
            let x = k as f64 / sigma;
            (-0.5 * x * x).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

fn round_up_to_odd(value: f64) -> usize {
    let n = value.ceil().max(1.0) as usize;
    if n % 2 == 0 { n + 1 } else { n }
}

/// Convolve `values` with a Gaussian of standard deviation `sigma` (in samples).
pub fn convolve_gaussian(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let kernel = gaussian_kernel(sigma);
    if kernel.len() == 1 {
        return values.to_vec();
    }

    let n = values.len() as i64;
    let half = (kernel.len() / 2) as i64;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| {
                    let j = (i + k as i64 - half).clamp(0, n - 1);
                    w * values[j as usize]
                })
                .sum()
        })
        .collect()
}
