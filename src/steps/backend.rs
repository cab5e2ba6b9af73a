//! Imaging backend boundary.
//!
//! Pixel-level work (coadds, ellipse fitting, plots, HTML, FITS catalogs) is
//! done by an external program. Each stage gets a typed JSON request on stdin;
//! a non-zero exit status becomes `StepError::Backend`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::debug;

use crate::domain::{Galaxy, SurveyInfo};
use crate::error::StepError;

/// Declination above which (within the RA window) the northern imaging is used.
const NORTH_DEC_MIN: f64 = 32.375;
const NORTH_RA_RANGE: (f64, f64) = (100.0, 300.0);

/// `north` or `south` imaging run covering `galaxy`.
pub fn imaging_run(galaxy: &Galaxy) -> &'static str {
    if galaxy.dec >= NORTH_DEC_MIN && galaxy.ra > NORTH_RA_RANGE.0 && galaxy.ra < NORTH_RA_RANGE.1 {
        "north"
    } else {
        "south"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoaddRequest<'a> {
    pub galaxy: &'a Galaxy,
    pub galaxy_dir: &'a Path,
    pub survey: &'a SurveyInfo,
    pub radius_mosaic_arcsec: f64,
    pub subsky_radii: [f64; 8],
    pub nproc: usize,
    pub pixscale: f64,
    pub unwise: bool,
    pub force: bool,
    pub cleanup: bool,
    pub just_coadds: bool,
    pub require_grz: bool,
    pub debug: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EllipseRequest<'a> {
    pub galaxy: &'a Galaxy,
    pub galaxy_dir: &'a Path,
    pub bands: [&'static str; 3],
    pub refband: &'static str,
    pub pixscale: f64,
    pub nproc: usize,
    pub sky_tests: bool,
    pub clobber: bool,
    pub debug: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotRequest<'a> {
    pub galaxy: &'a Galaxy,
    pub galaxy_dir: &'a Path,
    pub survey: &'a SurveyInfo,
    pub html_dir: &'a Path,
    pub data_dir: &'a Path,
    pub pixscale: f64,
    pub nproc: usize,
    /// Scale bar length [pixels].
    pub barlen: u32,
    pub barlabel: &'static str,
    pub radius_mosaic_arcsec: f64,
    pub just_coadds: bool,
    pub clobber: bool,
    pub debug: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HtmlIndexRequest<'a> {
    pub sample: &'a [Galaxy],
    pub html_dir: &'a Path,
    pub data_dir: &'a Path,
    pub pixscale: f64,
    pub nproc: usize,
    pub clobber: bool,
    pub verbose: bool,
}

/// One row of the pipeline reference catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefcatRow {
    pub ra: f64,
    pub dec: f64,
    pub sga_id: i64,
    pub mag_leda: Option<f64>,
    pub ba: f32,
    pub pa: f32,
    /// [arcmin]
    pub diam: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefcatRequest<'a> {
    pub path: &'a Path,
    /// Header keyword `SGAVER`.
    pub version: &'a str,
    pub rows: &'a [RefcatRow],
}

pub trait ImagingBackend: Send + Sync {
    /// Resolve the imaging run and survey output directory for one galaxy.
    fn survey(&self, galaxy: &Galaxy, galaxy_dir: &Path) -> Result<SurveyInfo, StepError> {
        Ok(SurveyInfo {
            run: imaging_run(galaxy).to_string(),
            output_dir: galaxy_dir.to_path_buf(),
        })
    }

    fn build_custom_coadds(&self, request: &CoaddRequest<'_>, logfile: Option<&Path>) -> Result<(), StepError>;
    fn build_ellipse(&self, request: &EllipseRequest<'_>, logfile: Option<&Path>) -> Result<(), StepError>;
    fn build_html_plots(&self, request: &PlotRequest<'_>, logfile: Option<&Path>) -> Result<(), StepError>;
    fn build_html_index(&self, request: &HtmlIndexRequest<'_>) -> Result<(), StepError>;
    fn write_reference_catalog(&self, request: &RefcatRequest<'_>) -> Result<(), StepError>;
}

/// Runs `<program> <stage>` with the request as JSON on stdin.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: PathBuf,
}

impl CommandBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn invoke<R: Serialize>(&self, stage: &'static str, request: &R, logfile: Option<&Path>) -> Result<(), StepError> {
        let body = serde_json::to_vec(request).map_err(|source| StepError::Serialize {
            what: "backend request",
            source,
        })?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(stage).stdin(Stdio::piped());
        match logfile {
            Some(path) => {
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| StepError::io(path, e))?;
                let err = log.try_clone().map_err(|e| StepError::io(path, e))?;
                cmd.stdout(Stdio::from(log)).stderr(Stdio::from(err));
            }
            None => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        debug!(program = %self.program.display(), stage, "Invoking imaging backend");
        let mut child = cmd.spawn().map_err(|e| StepError::Backend {
            stage,
            message: format!("failed to start {}: {e}", self.program.display()),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A stage that ignores its request may exit before reading it.
            match stdin.write_all(&body) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(StepError::Backend {
                        stage,
                        message: format!("failed to send request: {e}"),
                    });
                }
            }
        }

        let status = child.wait().map_err(|e| StepError::Backend {
            stage,
            message: format!("failed to wait for backend: {e}"),
        })?;
        if !status.success() {
            return Err(StepError::Backend {
                stage,
                message: format!("exited with {status}"),
            });
        }
        Ok(())
    }
}

impl ImagingBackend for CommandBackend {
    fn build_custom_coadds(&self, request: &CoaddRequest<'_>, logfile: Option<&Path>) -> Result<(), StepError> {
        self.invoke("coadds", request, logfile)
    }

    fn build_ellipse(&self, request: &EllipseRequest<'_>, logfile: Option<&Path>) -> Result<(), StepError> {
        self.invoke("ellipse", request, logfile)
    }

    fn build_html_plots(&self, request: &PlotRequest<'_>, logfile: Option<&Path>) -> Result<(), StepError> {
        self.invoke("htmlplots", request, logfile)
    }

    fn build_html_index(&self, request: &HtmlIndexRequest<'_>) -> Result<(), StepError> {
        self.invoke("htmlindex", request, None)
    }

    fn write_reference_catalog(&self, request: &RefcatRequest<'_>) -> Result<(), StepError> {
        self.invoke("refcat", request, None)
    }
}
