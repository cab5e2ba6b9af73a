//! Per-galaxy Sersic fitting suite.
//!
//! Fits every model kind with and without wavelength-dependent `n`/`r50`
//! and writes each result next to the galaxy's ellipse profile.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::data::read_ellipsefit;
use crate::domain::SersicOptions;
use crate::error::StepError;
use crate::fit::wave_fit::SersicWaveFit;
use crate::io::write_sersic;
use crate::models::ModelKind;
use crate::report::format_fit_summary;

/// Fit order of the suite.
const SUITE_ORDER: [ModelKind; 4] = [
    ModelKind::Triple,
    ModelKind::Exponential,
    ModelKind::Single,
    ModelKind::Double,
];

#[derive(Debug, Clone, PartialEq)]
pub enum SuiteOutcome {
    /// No ellipse profile, or the ellipse fit itself failed.
    NothingToDo,
    Fitted {
        single_success: bool,
        written: Vec<PathBuf>,
    },
}

impl SuiteOutcome {
    /// 1 when the single-Sersic fit succeeded, else 0.
    pub fn status_code(&self) -> u8 {
        match self {
            SuiteOutcome::Fitted { single_success: true, .. } => 1,
            _ => 0,
        }
    }
}

/// Run all eight fits for `galaxy` and persist the results.
pub fn fit_sersic_suite(galaxy: &str, galaxy_dir: &Path, options: &SersicOptions) -> Result<SuiteOutcome, StepError> {
    let Some(ellipse) = read_ellipsefit(galaxy, galaxy_dir)? else {
        info!(galaxy, "No ellipse profile; nothing to fit");
        return Ok(SuiteOutcome::NothingToDo);
    };
    if !ellipse.success {
        info!(galaxy, "Ellipse fit was unsuccessful; nothing to fit");
        return Ok(SuiteOutcome::NothingToDo);
    }

    let fitter = SersicWaveFit::new(&ellipse, *options);
    if fitter.data().is_empty() {
        warn!(galaxy, "No profile points pass the signal-to-noise cut");
    }

    let mut written = Vec::with_capacity(SUITE_ORDER.len() * 2);
    let mut single_success = false;

    for kind in SUITE_ORDER {
        for nowavepower in [true, false] {
            let result = fitter.fit(kind, options.nball, nowavepower, nowavepower);
            debug!(galaxy, "{}", format_fit_summary(&result).trim_end());
            if kind == ModelKind::Single && !nowavepower {
                single_success = result.success;
            }
            written.push(write_sersic(galaxy, galaxy_dir, &result)?);
        }
    }

    Ok(SuiteOutcome::Fitted { single_success, written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BandProfile, EllipseFit, ellipse_path};
    use crate::domain::Band;
    use crate::io::read_sersic;
    use crate::models::sersic_profile;

    fn write_ellipse(dir: &Path, galaxy: &str, success: bool) {
        let profiles = Band::ALL
            .iter()
            .map(|&band| {
                let sma: Vec<f64> = (1..=12).map(|i| i as f64 * 5.0).collect();
                let intens: Vec<f64> = sma.iter().map(|s| sersic_profile(s * 0.262, 2.0, 5.0, 1.0)).collect();
                BandProfile {
                    band,
                    eps: vec![0.1; sma.len()],
                    int_err: intens.iter().map(|v| 0.05 * v).collect(),
                    sma,
                    intens,
                }
            })
            .collect();
        let fit = EllipseFit {
            success,
            refband: Band::R,
            pixscale: 0.262,
            redshift: None,
            psfsigma_g: 0.0,
            psfsigma_r: 0.0,
            psfsigma_z: 0.0,
            profiles,
        };
        std::fs::write(ellipse_path(galaxy, dir), serde_json::to_string(&fit).unwrap()).unwrap();
    }

    fn options() -> SersicOptions {
        SersicOptions {
            nball: 2,
            seed: Some(7),
            ..SersicOptions::default()
        }
    }

    #[test]
    fn missing_profile_is_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = fit_sersic_suite("G1", dir.path(), &options()).unwrap();
        assert_eq!(outcome, SuiteOutcome::NothingToDo);
        assert_eq!(outcome.status_code(), 0);
    }

    #[test]
    fn failed_ellipse_is_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        write_ellipse(dir.path(), "G1", false);
        assert_eq!(fit_sersic_suite("G1", dir.path(), &options()).unwrap(), SuiteOutcome::NothingToDo);
    }

    #[test]
    fn writes_all_eight_variants() {
        let dir = tempfile::tempdir().unwrap();
        write_ellipse(dir.path(), "G1", true);

        let outcome = fit_sersic_suite("G1", dir.path(), &options()).unwrap();
        let SuiteOutcome::Fitted { written, .. } = &outcome else {
            panic!("expected fits, got {outcome:?}");
        };
        assert_eq!(written.len(), 8);

        for kind in ModelKind::ALL {
            for nowavepower in [true, false] {
                let tag = kind.modeltype(nowavepower);
                let result = read_sersic("G1", dir.path(), &tag).unwrap();
                assert_eq!(result.map(|r| r.modeltype), Some(tag));
            }
        }
    }
}
