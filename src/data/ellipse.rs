//! Ellipse-fit surface-brightness profiles.
//!
//! The imaging backend writes one `{galaxy}-ellipse.json` per galaxy. Each
//! band carries the isophote semi-major axes, ellipticities, mean intensities
//! and intensity uncertainties; the top level carries the PSF widths and the
//! run metadata the Sersic fits need.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Band;
use crate::error::StepError;

/// Isophotal profile in one band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandProfile {
    pub band: Band,
    /// Semi-major axis [pixels].
    pub sma: Vec<f64>,
    pub eps: Vec<f64>,
    pub intens: Vec<f64>,
    pub int_err: Vec<f64>,
}

impl BandProfile {
    pub fn len(&self) -> usize {
        self.sma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sma.is_empty()
    }
}

/// Contents of `{galaxy}-ellipse.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllipseFit {
    pub success: bool,
    pub refband: Band,
    /// [arcsec/pixel]
    pub pixscale: f64,
    #[serde(default)]
    pub redshift: Option<f64>,
    #[serde(default)]
    pub psfsigma_g: f64,
    #[serde(default)]
    pub psfsigma_r: f64,
    #[serde(default)]
    pub psfsigma_z: f64,
    #[serde(default)]
    pub profiles: Vec<BandProfile>,
}

impl EllipseFit {
    pub fn profile(&self, band: Band) -> Option<&BandProfile> {
        self.profiles.iter().find(|p| p.band == band)
    }

    /// PSF sigmas in g/r/z order.
    pub fn psf_sigmas(&self) -> [f64; 3] {
        [self.psfsigma_g, self.psfsigma_r, self.psfsigma_z]
    }
}

pub fn ellipse_path(galaxy: &str, galaxy_dir: &Path) -> PathBuf {
    galaxy_dir.join(format!("{galaxy}-ellipse.json"))
}

/// Read the ellipse fit for `galaxy`; `Ok(None)` when the file does not exist.
pub fn read_ellipsefit(galaxy: &str, galaxy_dir: &Path) -> Result<Option<EllipseFit>, StepError> {
    let path = ellipse_path(galaxy, galaxy_dir);
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StepError::io(path, e)),
    };
    let fit: EllipseFit =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StepError::Parse { path, source })?;
    Ok(Some(fit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_ellipsefit("NGC0000", dir.path()).unwrap().is_none());
    }

    #[test]
    fn reads_profiles_by_band() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{
            "success": true,
            "refband": "r",
            "pixscale": 0.262,
            "redshift": 0.03,
            "psfsigma_r": 1.1,
            "profiles": [
                {"band": "r", "sma": [1.0, 2.0], "eps": [0.1, 0.2], "intens": [5.0, 3.0], "int_err": [0.1, 0.1]}
            ]
        }"#;
        std::fs::write(ellipse_path("UGC1", dir.path()), json).unwrap();

        let fit = read_ellipsefit("UGC1", dir.path()).unwrap().unwrap();
        assert!(fit.success);
        assert_eq!(fit.refband, Band::R);
        assert_eq!(fit.psf_sigmas(), [0.0, 1.1, 0.0]);
        assert_eq!(fit.profile(Band::R).map(BandProfile::len), Some(2));
        assert!(fit.profile(Band::G).is_none());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(ellipse_path("bad", dir.path()), "{not json").unwrap();
        let err = read_ellipsefit("bad", dir.path()).unwrap_err();
        assert!(matches!(err, StepError::Parse { .. }));
    }
}
