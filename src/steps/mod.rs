//! Pipeline steps.
//!
//! A step is either distributed (run once per galaxy, on whichever rank the
//! galaxy was assigned to) or serial (run once on rank 0 over the whole
//! sample). `StepFactory` maps the command-line selection onto one of them.

pub mod backend;
pub mod coadds;
pub mod ellipse;
pub mod html_index;
pub mod plots;
pub mod refcat;
pub mod sersic;

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::{ENV_REFCAT, Galaxy, PipelineConfig, RunOptions, Sample, StepKind, SurveyInfo};
use crate::error::{AppError, StepError};

pub use backend::{CommandBackend, ImagingBackend};

/// Sky-annulus radii as multiples of the mosaic radius (four inner/outer pairs).
const SUBSKY_FACTORS: [f64; 8] = [1.0, 1.1, 1.2, 1.3, 1.3, 1.4, 1.4, 1.5];

/// Everything a distributed step needs to process one galaxy.
#[derive(Debug, Clone)]
pub struct StepContext<'a> {
    pub index: usize,
    pub galaxy: &'a Galaxy,
    pub galaxy_dir: PathBuf,
    /// [arcsec]
    pub radius_mosaic_arcsec: f64,
    /// [arcsec]
    pub subsky_radii: [f64; 8],
    /// Per-galaxy log; only set in debug mode.
    pub logfile: Option<PathBuf>,
    pub survey: SurveyInfo,
    pub rank: usize,
}

impl<'a> StepContext<'a> {
    pub fn new(
        index: usize,
        galaxy: &'a Galaxy,
        galaxy_dir: PathBuf,
        suffix: &str,
        rank: usize,
        debug: bool,
        survey: SurveyInfo,
    ) -> Self {
        let radius_mosaic_arcsec = galaxy.mosaic_radius_arcsec();
        let logfile = debug.then(|| {
            let name = if rank == 0 {
                format!("{}-{suffix}.log", galaxy.galaxy)
            } else {
                format!("{}-{suffix}-rank{rank}.log", galaxy.galaxy)
            };
            galaxy_dir.join(name)
        });

        Self {
            index,
            galaxy,
            radius_mosaic_arcsec,
            subsky_radii: SUBSKY_FACTORS.map(|f| f * radius_mosaic_arcsec),
            logfile,
            survey,
            rank,
            galaxy_dir,
        }
    }

    pub fn name(&self) -> &str {
        &self.galaxy.galaxy
    }
}

/// A step run once per galaxy.
pub trait GalaxyStep: Send + Sync {
    fn kind(&self) -> StepKind;
    fn run(&self, ctx: &StepContext<'_>) -> Result<(), StepError>;
}

/// A step run once, on rank 0, over the whole sample.
pub trait SampleStep: Send + Sync {
    fn kind(&self) -> StepKind;
    fn run(&self, sample: &Sample) -> Result<(), StepError>;
}

pub enum Step {
    Distributed(Box<dyn GalaxyStep>),
    Serial(Box<dyn SampleStep>),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Distributed(s) => s.kind(),
            Step::Serial(s) => s.kind(),
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Distributed(s) => write!(f, "Distributed({:?})", s.kind()),
            Step::Serial(s) => write!(f, "Serial({:?})", s.kind()),
        }
    }
}

/// Step selection flags as given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepFlags {
    pub coadds: bool,
    pub ellipse: bool,
    pub htmlplots: bool,
    pub sersic: bool,
    pub htmlindex: bool,
    pub build_refcat: bool,
}

impl StepFlags {
    pub fn only(kind: StepKind) -> Self {
        let mut flags = Self::default();
        match kind {
            StepKind::Coadds => flags.coadds = true,
            StepKind::Ellipse => flags.ellipse = true,
            StepKind::HtmlPlots => flags.htmlplots = true,
            StepKind::Sersic => flags.sersic = true,
            StepKind::HtmlIndex => flags.htmlindex = true,
            StepKind::Refcat => flags.build_refcat = true,
        }
        flags
    }

    fn is_set(&self, kind: StepKind) -> bool {
        match kind {
            StepKind::Coadds => self.coadds,
            StepKind::Ellipse => self.ellipse,
            StepKind::HtmlPlots => self.htmlplots,
            StepKind::Sersic => self.sersic,
            StepKind::HtmlIndex => self.htmlindex,
            StepKind::Refcat => self.build_refcat,
        }
    }
}

pub struct StepFactory;

impl StepFactory {
    /// Exactly one step flag must be set.
    pub fn select(flags: &StepFlags) -> Result<StepKind, AppError> {
        let chosen: Vec<StepKind> = StepKind::ALL.into_iter().filter(|k| flags.is_set(*k)).collect();
        match chosen.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(AppError::config(format!(
                "No pipeline step selected; choose one of {}.",
                flag_list(&StepKind::ALL)
            ))),
            many => Err(AppError::config(format!(
                "Options {} are mutually exclusive.",
                flag_list(many)
            ))),
        }
    }

    /// Build the step for `kind`. Fails only on configuration the step needs
    /// but the environment does not provide.
    pub fn build(
        kind: StepKind,
        config: &PipelineConfig,
        options: &RunOptions,
        backend: Arc<dyn ImagingBackend>,
    ) -> Result<Step, AppError> {
        let step = match kind {
            StepKind::Coadds => Step::Distributed(Box::new(coadds::BuildCoadds::new(options.clone(), backend))),
            StepKind::Ellipse => Step::Distributed(Box::new(ellipse::BuildEllipse::new(options.clone(), backend))),
            StepKind::HtmlPlots => Step::Distributed(Box::new(plots::BuildPlots::new(
                config.clone(),
                options.clone(),
                backend,
            ))),
            StepKind::Sersic => Step::Distributed(Box::new(sersic::BuildSersic::new(options.sersic))),
            StepKind::HtmlIndex => Step::Serial(Box::new(html_index::BuildHtmlIndex::new(
                config.clone(),
                options.clone(),
                backend,
            ))),
            StepKind::Refcat => {
                let path = config.refcat_path.clone().ok_or_else(|| {
                    AppError::config(format!("{ENV_REFCAT} must be set to build the reference catalog."))
                })?;
                Step::Serial(Box::new(refcat::BuildRefcat::new(path, backend)))
            }
        };
        Ok(step)
    }
}

fn flag_list(kinds: &[StepKind]) -> String {
    kinds.iter().map(|k| k.flag()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn galaxy() -> Galaxy {
        Galaxy {
            galaxy: "NGC5000".into(),
            id: 3,
            ra: 200.0,
            dec: 28.0,
            diam: 40.0,
            mag: None,
            z: None,
            extra: Default::default(),
        }
    }

    fn survey() -> SurveyInfo {
        SurveyInfo {
            run: "south".into(),
            output_dir: PathBuf::from("/data/NGC5000"),
        }
    }

    #[test]
    fn select_requires_exactly_one_flag() {
        assert_eq!(StepFactory::select(&StepFlags::only(StepKind::Ellipse)).unwrap(), StepKind::Ellipse);

        let none = StepFactory::select(&StepFlags::default()).unwrap_err();
        assert_eq!(none.exit_code(), 2);

        let both = StepFlags {
            coadds: true,
            htmlindex: true,
            ..StepFlags::default()
        };
        let err = StepFactory::select(&both).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("--coadds"));
        assert!(err.message().contains("--htmlindex"));
    }

    #[test]
    fn serial_and_distributed_steps_are_built_accordingly() {
        let mut config = PipelineConfig::rooted_at("/tmp/lh");
        config.refcat_path = Some(PathBuf::from("/tmp/lh/refcat.fits"));
        let options = RunOptions::default();
        let backend: Arc<dyn ImagingBackend> = Arc::new(CommandBackend::new("true"));
        for kind in StepKind::ALL {
            let step = StepFactory::build(kind, &config, &options, Arc::clone(&backend)).unwrap();
            assert_eq!(step.kind(), kind);
            assert_eq!(matches!(step, Step::Serial(_)), kind.is_serial());
        }
    }

    #[test]
    fn refcat_needs_a_catalog_path() {
        let config = PipelineConfig::rooted_at("/tmp/lh");
        let backend: Arc<dyn ImagingBackend> = Arc::new(CommandBackend::new("true"));
        let err = StepFactory::build(StepKind::Refcat, &config, &RunOptions::default(), backend).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn context_derives_radii_and_logfile() {
        let g = galaxy();
        let dir = PathBuf::from("/data/NGC5000");
        let ctx = StepContext::new(4, &g, dir.clone(), "coadds", 0, true, survey());
        assert_eq!(ctx.radius_mosaic_arcsec, 20.0);
        assert_eq!(ctx.subsky_radii[0], 20.0);
        assert!((ctx.subsky_radii[7] - 30.0).abs() < 1e-12);
        assert_eq!(ctx.logfile, Some(dir.join("NGC5000-coadds.log")));

        let other = StepContext::new(4, &g, dir.clone(), "coadds", 2, true, survey());
        assert_eq!(other.logfile, Some(dir.join("NGC5000-coadds-rank2.log")));

        let quiet = StepContext::new(4, &g, dir, "coadds", 0, false, survey());
        assert!(quiet.logfile.is_none());
    }
}
