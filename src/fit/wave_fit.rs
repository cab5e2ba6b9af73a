//! Multi-start Sersic fitting of multi-band surface-brightness profiles.
//!
//! One fit:
//!
//! - perturbs the model defaults into `nball` starting vectors (seeded)
//! - runs Levenberg–Marquardt from each start (parallel)
//! - keeps the lowest reduced chi-square and re-fits from that solution
//!
//! A fit that never produces a usable covariance is reported through
//! `FitResult::success`, not as an error.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::data::EllipseFit;
use crate::domain::{Band, FitResult, FittedParam, SersicOptions};
use crate::fit::lm::{LmOptions, LmOutcome, levenberg_marquardt};
use crate::models::{ModelKind, ModelSetup, SersicModel};

/// Iteration cap for each ball.
const BALL_MAXITER: usize = 200;
/// Iteration cap for the final re-fit from the best ball.
const FINAL_MAXITER: usize = 100;

/// Flattened multi-band profile: one entry per kept isophote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileData {
    /// Circularized radius [arcsec].
    pub radius: Vec<f64>,
    /// Band wavelength [Angstrom].
    pub wave: Vec<f64>,
    pub sb: Vec<f64>,
    pub sberr: Vec<f64>,
}

impl ProfileData {
    /// Flatten an ellipse fit: circularize radii, floor the uncertainties
    /// with `minerr` [mag], and drop points below `snrmin`.
    pub fn from_ellipse(ellipse: &EllipseFit, setup: &ModelSetup, minerr: f64, snrmin: f64) -> Self {
        let mut data = ProfileData::default();
        let floor = 0.4 * std::f64::consts::LN_10 * minerr;

        for band in &setup.bands {
            let Some(profile) = ellipse.profile(band.band) else {
                info!("Keeping 0 / 0 measurements in band {}", band.band.name());
                continue;
            };

            let total = profile.len();
            let mut kept = 0;
            for i in 0..total {
                let (Some(&sma), Some(&eps), Some(&sb), Some(&int_err)) = (
                    profile.sma.get(i),
                    profile.eps.get(i),
                    profile.intens.get(i),
                    profile.int_err.get(i),
                ) else {
                    break;
                };
                let radius = sma * (1.0 - eps).sqrt() * ellipse.pixscale;
                let sberr = (int_err * int_err + (floor * sb).powi(2)).sqrt();
                if !(radius.is_finite() && sb.is_finite() && sberr.is_finite()) || !(sb / sberr > snrmin) {
                    continue;
                }
                data.radius.push(radius);
                data.wave.push(band.lambda);
                data.sb.push(sb);
                data.sberr.push(sberr);
                kept += 1;
            }
            info!("Keeping {kept} / {total} measurements in band {}", band.band.name());
        }

        data
    }

    pub fn len(&self) -> usize {
        self.sb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sb.is_empty()
    }
}

/// Multi-start fitter bound to one galaxy's profile.
#[derive(Debug, Clone)]
pub struct SersicWaveFit {
    data: ProfileData,
    setup: ModelSetup,
    redshift: Option<f64>,
    options: SersicOptions,
}

/// Outcome of one ball.
#[derive(Debug, Clone)]
struct BallRun {
    values: Vec<f64>,
    chi2: f64,
    message: String,
}

impl SersicWaveFit {
    pub fn new(ellipse: &EllipseFit, options: SersicOptions) -> Self {
        let setup = ModelSetup::with_psf(ellipse.psf_sigmas(), ellipse.pixscale);
        let data = ProfileData::from_ellipse(ellipse, &setup, options.minerr, options.snrmin);
        Self::from_profile(data, setup, ellipse.redshift, options)
    }

    pub fn from_profile(data: ProfileData, setup: ModelSetup, redshift: Option<f64>, options: SersicOptions) -> Self {
        Self {
            data,
            setup,
            redshift,
            options,
        }
    }

    pub fn data(&self) -> &ProfileData {
        &self.data
    }

    pub fn setup(&self) -> &ModelSetup {
        &self.setup
    }

    /// Fit `kind` from `ball_count` perturbed starts.
    pub fn fit(&self, kind: ModelKind, ball_count: usize, fix_alpha: bool, fix_beta: bool) -> FitResult {
        let model = SersicModel::new(kind, self.setup.clone(), fix_alpha, fix_beta);
        let modeltype = kind.modeltype(fix_alpha && fix_beta);
        self.fit_model(&model, &modeltype, ball_count)
    }

    /// Fit a prepared model (custom starting values, fixed values).
    pub fn fit_model(&self, model: &SersicModel, modeltype: &str, ball_count: usize) -> FitResult {
        let spec = model.parameter_spec();
        let nparams = spec.len();
        let dof = self.data.len() as i64 - nparams as i64;
        let chi2fail = self.options.chi2fail;

        let defaults = model.default_values();
        let mut result = self.empty_result(model, modeltype, &defaults, dof);

        let balls = self.perturb(model, ball_count);
        let free = model.free_indices();
        let (lower, upper) = free_bounds(model, &free);

        let runs: Vec<BallRun> = balls
            .par_iter()
            .map(|start| {
                let outcome = self.run_lm(model, start, &free, &lower, &upper, BALL_MAXITER);
                let values = model.expand(start, &free, &outcome.params);
                let chi2 = match outcome.covariance {
                    Some(_) => self.chi2(model, &values, dof),
                    None => chi2fail,
                };
                BallRun {
                    values,
                    chi2: if chi2.is_finite() { chi2 } else { chi2fail },
                    message: outcome.message,
                }
            })
            .collect();

        // Deterministic selection: lowest chi2, ties go to the earlier ball.
        let mut best: Option<&BallRun> = None;
        for run in &runs {
            if run.chi2 >= chi2fail {
                continue;
            }
            match best {
                Some(b) if b.chi2 <= run.chi2 => {}
                _ => best = Some(run),
            }
        }

        let Some(best) = best else {
            warn!("{}-Sersic fitting failed.", modeltype.to_uppercase());
            result.fit_message = runs
                .last()
                .map(|r| r.message.clone())
                .unwrap_or_else(|| format!("no usable fit: {} points for {nparams} parameters", self.data.len()));
            return result;
        };

        let final_fit = self.run_lm(model, &best.values, &free, &lower, &upper, FINAL_MAXITER);
        let values = model.expand(&best.values, &free, &final_fit.params);
        info!(
            "{} Sersic fitting succeeded with a chi^2 minimum of {:.2}",
            modeltype.to_uppercase(),
            best.chi2
        );

        let free_unc: Vec<f64> = match &final_fit.covariance {
            Some(cov) => (0..free.len()).map(|i| cov[(i, i)].max(0.0).sqrt()).collect(),
            None => vec![0.0; free.len()],
        };

        let mut unc = vec![0.0; nparams];
        for (slot, &i) in free.iter().enumerate() {
            unc[i] = free_unc[slot];
        }
        for (i, p) in spec.iter().enumerate() {
            if p.fixed {
                unc[i] = 0.0;
            } else if let Some(src) = p.tied {
                unc[i] = unc[src];
            }
        }

        result.success = true;
        result.converged = final_fit.covariance.is_some();
        result.chi2 = best.chi2;
        result.fit_message = final_fit.message;
        result.covariance = final_fit.covariance.as_ref().map(|cov| {
            (0..cov.nrows())
                .map(|r| (0..cov.ncols()).map(|c| cov[(r, c)]).collect())
                .collect()
        });
        for (i, param) in result.params.iter_mut().enumerate() {
            param.value = values[i];
            param.uncertainty = unc[i];
        }

        result
    }

    /// Reduced chi-square of `values` against the data.
    pub fn chi2(&self, model: &SersicModel, values: &[f64], dof: i64) -> f64 {
        if dof <= 0 {
            return self.options.chi2fail;
        }
        let sbmodel = model.evaluate(&self.data.radius, &self.data.wave, values);
        let sum: f64 = self
            .data
            .sb
            .iter()
            .zip(&sbmodel)
            .zip(&self.data.sberr)
            .map(|((sb, m), e)| (sb - m).powi(2) / (e * e))
            .sum();
        sum / dof as f64
    }

    fn perturb(&self, model: &SersicModel, ball_count: usize) -> Vec<Vec<f64>> {
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let base = model.default_values();
        let mut balls = vec![base; ball_count];

        for (i, p) in model.parameter_spec().iter().enumerate() {
            if !p.is_free() {
                continue;
            }
            let scale = match p.bounds {
                Some((lo, hi)) if p.default == 0.0 => 0.1 * (hi - lo),
                _ => 0.2 * p.default.abs(),
            };
            let Ok(normal) = Normal::new(0.0, scale) else {
                continue;
            };
            for ball in balls.iter_mut() {
                let v = p.default + normal.sample(&mut rng);
                ball[i] = if p.in_bounds(v) { v } else { p.default };
            }
        }

        for ball in balls.iter_mut() {
            model.apply_ties(ball);
        }
        balls
    }

    fn run_lm(
        &self,
        model: &SersicModel,
        start: &[f64],
        free: &[usize],
        lower: &[f64],
        upper: &[f64],
        max_iter: usize,
    ) -> LmOutcome {
        let x0: Vec<f64> = free.iter().map(|&i| start[i]).collect();
        let residuals = |x: &[f64]| -> Vec<f64> {
            let values = model.expand(start, free, x);
            let sbmodel = model.evaluate(&self.data.radius, &self.data.wave, &values);
            self.data
                .sb
                .iter()
                .zip(&sbmodel)
                .zip(&self.data.sberr)
                .map(|((sb, m), e)| (sb - m) / e)
                .collect()
        };
        levenberg_marquardt(residuals, &x0, lower, upper, &LmOptions::with_max_iter(max_iter))
    }

    fn empty_result(&self, model: &SersicModel, modeltype: &str, defaults: &[f64], dof: i64) -> FitResult {
        let spec = model.parameter_spec();
        let params = spec
            .iter()
            .zip(defaults)
            .map(|(p, &value)| FittedParam {
                name: p.name.clone(),
                value,
                uncertainty: 0.0,
                fixed: p.fixed,
                tied_to: p.tied.map(|src| spec[src].name.clone()),
            })
            .collect();

        FitResult {
            success: false,
            converged: false,
            modeltype: modeltype.to_string(),
            redshift: self.redshift,
            params,
            chi2: self.options.chi2fail,
            dof,
            covariance: None,
            fit_message: String::new(),
            radius: self.data.radius.clone(),
            wave: self.data.wave.clone(),
            sb: self.data.sb.clone(),
            sberr: self.data.sberr.clone(),
            bands: Band::ALL.to_vec(),
            lambda_ref: self.setup.lambda_ref,
            lambdas: self.setup.bands.iter().map(|b| b.lambda).collect(),
            minerr: self.options.minerr,
            pixscale: self.setup.pixscale,
            seed: self.options.seed,
        }
    }
}

fn free_bounds(model: &SersicModel, free: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let spec = model.parameter_spec();
    free.iter()
        .map(|&i| spec[i].bounds.unwrap_or((f64::NEG_INFINITY, f64::INFINITY)))
        .unzip()
}
