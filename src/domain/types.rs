//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - broadcast between ranks (sample rows, work assignments)
//! - handed to the imaging backend as JSON requests
//! - persisted as fit results and reloaded later

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Photometric band of the ellipse-fit profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    G,
    R,
    Z,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::G, Band::R, Band::Z];

    pub fn name(self) -> &'static str {
        match self {
            Band::G => "g",
            Band::R => "r",
            Band::Z => "z",
        }
    }

    /// DECam effective wavelength [Angstrom].
    pub fn default_wavelength(self) -> f64 {
        match self {
            Band::G => 4890.0,
            Band::R => 6470.0,
            Band::Z => 9196.0,
        }
    }
}

/// One row of the galaxy sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    /// Unique galaxy name; also names the per-galaxy output directory.
    pub galaxy: String,
    /// Reference-catalog identifier.
    #[serde(default)]
    pub id: i64,
    pub ra: f64,
    pub dec: f64,
    /// Angular diameter [arcsec].
    pub diam: f64,
    #[serde(default)]
    pub mag: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
    /// Survey-specific columns carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Galaxy {
    /// Mosaic radius [arcsec] used to size the custom coadds.
    pub fn mosaic_radius_arcsec(&self) -> f64 {
        self.diam / 2.0
    }
}

/// Ordered galaxy sample. Read once on rank 0 and broadcast read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample {
    rows: Vec<Galaxy>,
}

impl Sample {
    pub fn new(rows: Vec<Galaxy>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Galaxy> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Galaxy> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Galaxy] {
        &self.rows
    }
}

/// Pipeline step selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Coadds,
    Ellipse,
    HtmlPlots,
    Sersic,
    HtmlIndex,
    Refcat,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Coadds,
        StepKind::Ellipse,
        StepKind::HtmlPlots,
        StepKind::Sersic,
        StepKind::HtmlIndex,
        StepKind::Refcat,
    ];

    /// Command-line flag that selects this step.
    pub fn flag(self) -> &'static str {
        match self {
            StepKind::Coadds => "--coadds",
            StepKind::Ellipse => "--ellipse",
            StepKind::HtmlPlots => "--htmlplots",
            StepKind::Sersic => "--sersic",
            StepKind::HtmlIndex => "--htmlindex",
            StepKind::Refcat => "--build-refcat",
        }
    }

    /// Artifact suffix used in marker, log, and progress names.
    pub fn suffix(self) -> &'static str {
        match self {
            StepKind::Coadds => "coadds",
            StepKind::Ellipse => "ellipse",
            StepKind::HtmlPlots => "html",
            StepKind::Sersic => "sersic",
            StepKind::HtmlIndex => "htmlindex",
            StepKind::Refcat => "refcat",
        }
    }

    /// Serial steps run once on rank 0 over the whole sample.
    pub fn is_serial(self) -> bool {
        matches!(self, StepKind::HtmlIndex | StepKind::Refcat)
    }
}

/// Survey/run metadata for one galaxy, resolved by the imaging backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyInfo {
    /// Imaging run (`north` / `south`).
    pub run: String,
    /// Output directory the survey object writes into.
    pub output_dir: PathBuf,
}

/// Run options derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub nproc: usize,
    pub pixscale: f64,
    pub clobber: bool,
    pub debug: bool,
    pub verbose: bool,
    pub count: bool,
    pub unwise: bool,
    pub force: bool,
    pub cleanup: bool,
    pub just_coadds: bool,
    pub sky_tests: bool,
    pub sersic: SersicOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            nproc: 1,
            pixscale: 0.262,
            clobber: false,
            debug: false,
            verbose: false,
            count: false,
            unwise: false,
            force: false,
            cleanup: false,
            just_coadds: false,
            sky_tests: false,
            sersic: SersicOptions::default(),
        }
    }
}

/// Options for the multi-start Sersic fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SersicOptions {
    /// Number of perturbed starting points ("balls").
    pub nball: usize,
    /// RNG seed for the perturbations; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Minimum fractional uncertainty added in quadrature [mag].
    pub minerr: f64,
    /// Minimum signal-to-noise of a profile point to be fit.
    pub snrmin: f64,
    /// Sentinel chi-square for failed runs.
    pub chi2fail: f64,
}

impl Default for SersicOptions {
    fn default() -> Self {
        Self {
            nball: 10,
            seed: None,
            minerr: 0.01,
            snrmin: 1.0,
            chi2fail: 1e6,
        }
    }
}

/// Which row subset of the sample file to read.
#[derive(Debug, Clone, Default)]
pub struct SampleSelection {
    pub fname: Option<PathBuf>,
    pub first: Option<usize>,
    pub last: Option<usize>,
    pub galaxylist: Option<Vec<String>>,
}

/// Per-parameter outcome of a Sersic fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParam {
    pub name: String,
    pub value: f64,
    /// 1σ uncertainty; 0 for fixed parameters, copied from the source for tied ones.
    pub uncertainty: f64,
    pub fixed: bool,
    #[serde(default)]
    pub tied_to: Option<String>,
}

/// Output of one `SersicWaveFit::fit` call.
///
/// Failure to converge is represented here (`success = false`), never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub success: bool,
    pub converged: bool,
    pub modeltype: String,
    pub redshift: Option<f64>,
    pub params: Vec<FittedParam>,
    pub chi2: f64,
    pub dof: i64,
    pub covariance: Option<Vec<Vec<f64>>>,
    pub fit_message: String,

    pub radius: Vec<f64>,
    pub wave: Vec<f64>,
    pub sb: Vec<f64>,
    pub sberr: Vec<f64>,

    pub bands: Vec<Band>,
    pub lambda_ref: f64,
    pub lambdas: Vec<f64>,
    pub minerr: f64,
    pub pixscale: f64,
    pub seed: Option<u64>,
}

impl FitResult {
    pub fn param(&self, name: &str) -> Option<&FittedParam> {
        self.params.iter().find(|p| p.name == name)
    }
}
