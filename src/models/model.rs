//! Wavelength-dependent Sersic surface-brightness models.
//!
//! Every model evaluates, per band,
//!
//! ```text
//! n(λ)   = nref   * (λ / λref)^alpha
//! r50(λ) = r50ref * (λ / λref)^beta
//! μ(r)   = μ50 * exp(-b(n) * ((r / r50)^(1/n) - 1))
//! ```
//!
//! summed over the model's components and optionally smoothed with the band's
//! Gaussian PSF. Points are matched to bands by wavelength.

use crate::domain::Band;
use crate::math::{convolve_gaussian, sersic_b};
use crate::models::param::{ModelKind, ParamSpec, index_of, parameter_table};

/// Reference wavelength for the power laws [Angstrom].
pub const LAMBDA_REF: f64 = 6470.0;
/// Default pixel scale [arcsec/pixel].
pub const DEFAULT_PIXSCALE: f64 = 0.262;

/// Per-band evaluation setup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSetup {
    pub band: Band,
    /// Effective wavelength [Angstrom].
    pub lambda: f64,
    /// PSF sigma in profile samples; 0 disables smoothing.
    pub psf_sigma: f64,
}

/// Observing setup shared by all model kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSetup {
    pub bands: [BandSetup; 3],
    pub lambda_ref: f64,
    pub pixscale: f64,
}

impl ModelSetup {
    /// DECam g/r/z with the given PSF sigmas.
    pub fn with_psf(psf_sigma: [f64; 3], pixscale: f64) -> Self {
        let mut bands = [BandSetup {
            band: Band::G,
            lambda: 0.0,
            psf_sigma: 0.0,
        }; 3];
        for (slot, (band, sigma)) in bands.iter_mut().zip(Band::ALL.iter().zip(psf_sigma)) {
            *slot = BandSetup {
                band: *band,
                lambda: band.default_wavelength(),
                psf_sigma: sigma,
            };
        }
        Self {
            bands,
            lambda_ref: LAMBDA_REF,
            pixscale,
        }
    }
}

impl Default for ModelSetup {
    fn default() -> Self {
        Self::with_psf([0.0; 3], DEFAULT_PIXSCALE)
    }
}

/// Parameter indices of one additive component.
#[derive(Debug, Clone, Copy)]
struct Component {
    nref: usize,
    r50ref: usize,
    /// `None` for the exponential disk, whose index does not vary with wavelength.
    alpha: Option<usize>,
    beta: usize,
    mu50: [usize; 3],
}

/// A fittable Sersic model: parameter table + evaluation.
#[derive(Debug, Clone)]
pub struct SersicModel {
    kind: ModelKind,
    params: Vec<ParamSpec>,
    components: Vec<Component>,
    setup: ModelSetup,
}

impl SersicModel {
    pub fn new(kind: ModelKind, setup: ModelSetup, fix_alpha: bool, fix_beta: bool) -> Self {
        let params = parameter_table(kind, fix_alpha, fix_beta);
        let components = resolve_components(kind, &params);
        debug_assert!(components.is_some(), "{kind:?} table is missing a component parameter");
        Self {
            kind,
            params,
            components: components.unwrap_or_default(),
            setup,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn setup(&self) -> &ModelSetup {
        &self.setup
    }

    pub fn parameter_spec(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Override the starting (and, for fixed parameters, final) value of `name`.
    /// Returns `false` when the model has no such parameter.
    pub fn set_default(&mut self, name: &str, value: f64) -> bool {
        match index_of(&self.params, name) {
            Some(i) => {
                self.params[i].default = value;
                true
            }
            None => false,
        }
    }

    /// Default parameter vector with ties applied.
    pub fn default_values(&self) -> Vec<f64> {
        let mut values: Vec<f64> = self.params.iter().map(|p| p.default).collect();
        self.apply_ties(&mut values);
        values
    }

    /// Indices of the parameters the optimizer adjusts.
    pub fn free_indices(&self) -> Vec<usize> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_free())
            .map(|(i, _)| i)
            .collect()
    }

    /// Copy tie sources into their tied parameters.
    pub fn apply_ties(&self, values: &mut [f64]) {
        for (i, p) in self.params.iter().enumerate() {
            if let Some(src) = p.tied {
                values[i] = values[src];
            }
        }
    }

    /// Expand a free-parameter vector into a full one, clipping to bounds.
    pub fn expand(&self, base: &[f64], free: &[usize], free_values: &[f64]) -> Vec<f64> {
        let mut values = base.to_vec();
        for (&i, &v) in free.iter().zip(free_values) {
            values[i] = self.params[i].clip(v);
        }
        self.apply_ties(&mut values);
        values
    }

    /// Sersic index at wavelength `lambda`.
    pub fn sersic_n(&self, nref: f64, lambda: f64, alpha: f64) -> f64 {
        nref * (lambda / self.setup.lambda_ref).powf(alpha)
    }

    /// Half-light radius at wavelength `lambda`.
    pub fn r50(&self, r50ref: f64, lambda: f64, beta: f64) -> f64 {
        r50ref * (lambda / self.setup.lambda_ref).powf(beta)
    }

    /// Evaluate surface brightness at each `(radius, wave)` pair.
    ///
    /// # Panics
    /// Panics if `radius` and `wave` differ in length or `values` does not
    /// match the parameter table. Callers size these arrays from the model.
    pub fn evaluate(&self, radius: &[f64], wave: &[f64], values: &[f64]) -> Vec<f64> {
        assert_eq!(radius.len(), wave.len(), "radius/wave length mismatch");
        assert_eq!(values.len(), self.params.len(), "parameter vector length mismatch");

        let mut mu = vec![0.0; radius.len()];

        for (band_pos, band) in self.setup.bands.iter().enumerate() {
            let indx: Vec<usize> = wave
                .iter()
                .enumerate()
                .filter(|(_, w)| same_wavelength(**w, band.lambda))
                .map(|(i, _)| i)
                .collect();
            if indx.is_empty() {
                continue;
            }

            let mut profile = vec![0.0; indx.len()];
            for comp in &self.components {
                let alpha = comp.alpha.map(|i| values[i]).unwrap_or(0.0);
                let n = self.sersic_n(values[comp.nref], band.lambda, alpha);
                let r50 = self.r50(values[comp.r50ref], band.lambda, values[comp.beta]);
                let mu50 = values[comp.mu50[band_pos]];
                let b = sersic_b(n);
                for (slot, &i) in profile.iter_mut().zip(&indx) {
                    *slot += sersic_profile_with_b(radius[i], mu50, r50, n, b);
                }
            }

            if band.psf_sigma > 0.0 {
                profile = convolve_gaussian(&profile, band.psf_sigma);
            }

            for (&i, v) in indx.iter().zip(profile) {
                mu[i] = v;
            }
        }

        mu
    }
}

/// Analytic Sersic profile `μ50 * exp(-b(n) * ((r/r50)^(1/n) - 1))`.
pub fn sersic_profile(r: f64, mu50: f64, r50: f64, n: f64) -> f64 {
    sersic_profile_with_b(r, mu50, r50, n, sersic_b(n))
}

fn sersic_profile_with_b(r: f64, mu50: f64, r50: f64, n: f64, b: f64) -> f64 {
    mu50 * (-b * ((r / r50).powf(1.0 / n) - 1.0)).exp()
}

fn same_wavelength(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1.0)
}

/// Map each component onto its parameter indices; `None` if the table lacks a name.
fn resolve_components(kind: ModelKind, params: &[ParamSpec]) -> Option<Vec<Component>> {
    let idx = |name: &str| index_of(params, name);

    if kind == ModelKind::Single {
        return Some(vec![Component {
            nref: idx("nref")?,
            r50ref: idx("r50ref")?,
            alpha: Some(idx("alpha")?),
            beta: idx("beta")?,
            mu50: [idx("mu50_g")?, idx("mu50_r")?, idx("mu50_z")?],
        }]);
    }

    (1..=kind.component_count())
        .map(|c| {
            let alpha = if kind == ModelKind::Exponential && c == 2 {
                None
            } else {
                Some(idx(&format!("alpha{c}"))?)
            };
            Some(Component {
                nref: idx(&format!("nref{c}"))?,
                r50ref: idx(&format!("r50ref{c}"))?,
                alpha,
                beta: idx(&format!("beta{c}"))?,
                mu50: [
                    idx(&format!("mu50_g{c}"))?,
                    idx(&format!("mu50_r{c}"))?,
                    idx(&format!("mu50_z{c}"))?,
                ],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_parameter_table_resolves_its_components() {
        for kind in ModelKind::ALL {
            for (fix_alpha, fix_beta) in [(false, false), (true, true)] {
                let params = parameter_table(kind, fix_alpha, fix_beta);
                let components = resolve_components(kind, &params).unwrap();
                assert_eq!(components.len(), kind.component_count(), "{kind:?}");
            }
        }
        assert!(resolve_components(ModelKind::Double, &parameter_table(ModelKind::Single, false, false)).is_none());
    }

    #[test]
    fn single_component_returns_mu50_at_r50() {
        let model = SersicModel::new(ModelKind::Single, ModelSetup::default(), false, false);
        let mut values = model.default_values();
        values[0] = 2.5; // nref
        values[1] = 7.0; // r50ref
        values[5] = 42.0; // mu50_r

        let mu = model.evaluate(&[7.0], &[LAMBDA_REF], &values);
        assert!((mu[0] - 42.0).abs() < 1e-10, "mu={}", mu[0]);
    }

    #[test]
    fn profile_decreases_with_radius() {
        let mu_in = sersic_profile(1.0, 10.0, 5.0, 4.0);
        let mu_out = sersic_profile(20.0, 10.0, 5.0, 4.0);
        assert!(mu_in > 10.0);
        assert!(mu_out < 10.0);
    }

    #[test]
    fn wavelength_power_law_scales_index_and_radius() {
        let model = SersicModel::new(ModelKind::Single, ModelSetup::default(), false, false);
        let n = model.sersic_n(2.0, 2.0 * LAMBDA_REF, 1.0);
        let r = model.r50(3.0, 0.5 * LAMBDA_REF, 1.0);
        assert!((n - 4.0).abs() < 1e-12);
        assert!((r - 1.5).abs() < 1e-12);
    }

    #[test]
    fn bands_without_points_are_skipped() {
        let model = SersicModel::new(ModelKind::Double, ModelSetup::default(), false, false);
        let values = model.default_values();
        let radius = [1.0, 2.0, 3.0];
        let wave = [4890.0, 4890.0, 4890.0];
        let mu = model.evaluate(&radius, &wave, &values);
        assert_eq!(mu.len(), 3);
        assert!(mu.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn components_add_before_smoothing() {
        let setup = ModelSetup::default();
        let double = SersicModel::new(ModelKind::Double, setup.clone(), false, false);
        let values = double.default_values();
        let radius: Vec<f64> = (1..=5).map(|r| r as f64).collect();
        let wave = vec![LAMBDA_REF; radius.len()];
        let total = double.evaluate(&radius, &wave, &values);

        for (i, &r) in radius.iter().enumerate() {
            let expected = sersic_profile(r, 1.0, 3.0, 3.0) + sersic_profile(r, 0.1, 10.0, 1.0);
            assert!((total[i] - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn psf_smoothing_only_applies_to_its_band() {
        let sharp = SersicModel::new(ModelKind::Single, ModelSetup::default(), false, false);
        let blurred = SersicModel::new(
            ModelKind::Single,
            ModelSetup::with_psf([0.0, 1.5, 0.0], DEFAULT_PIXSCALE),
            false,
            false,
        );
        let values = sharp.default_values();
        let radius: Vec<f64> = (0..20).map(|r| r as f64 * 0.5).collect();
        let mut wave = vec![4890.0; 10];
        wave.extend(vec![6470.0; 10]);

        let a = sharp.evaluate(&radius, &wave, &values);
        let b = blurred.evaluate(&radius, &wave, &values);
        assert_eq!(a[..10], b[..10]);
        assert!(a[10..].iter().zip(&b[10..]).any(|(x, y)| (x - y).abs() > 1e-6));
    }

    #[test]
    fn ties_copy_source_values() {
        let model = SersicModel::new(ModelKind::Triple, ModelSetup::default(), false, false);
        let free = model.free_indices();
        let base = model.default_values();
        let free_values: Vec<f64> = free.iter().map(|&i| base[i] + 0.25).collect();
        let values = model.expand(&base, &free, &free_values);
        let params = model.parameter_spec();
        let a1 = values[index_of(params, "alpha1").unwrap()];
        assert_eq!(values[index_of(params, "alpha2").unwrap()], a1);
        assert_eq!(values[index_of(params, "alpha3").unwrap()], a1);
    }
}
