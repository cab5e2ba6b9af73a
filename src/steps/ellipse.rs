//! Ellipse fitting for one galaxy.

use std::sync::Arc;

use crate::domain::{Band, RunOptions, StepKind};
use crate::error::StepError;
use crate::steps::backend::{EllipseRequest, ImagingBackend};
use crate::steps::{GalaxyStep, StepContext};

pub struct BuildEllipse {
    options: RunOptions,
    backend: Arc<dyn ImagingBackend>,
}

impl BuildEllipse {
    pub fn new(options: RunOptions, backend: Arc<dyn ImagingBackend>) -> Self {
        Self { options, backend }
    }
}

impl GalaxyStep for BuildEllipse {
    fn kind(&self) -> StepKind {
        StepKind::Ellipse
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let request = EllipseRequest {
            galaxy: ctx.galaxy,
            galaxy_dir: &ctx.galaxy_dir,
            bands: Band::ALL.map(Band::name),
            refband: Band::R.name(),
            pixscale: self.options.pixscale,
            nproc: self.options.nproc,
            sky_tests: self.options.sky_tests,
            clobber: self.options.clobber,
            debug: self.options.debug,
            verbose: self.options.verbose,
        };
        self.backend.build_ellipse(&request, ctx.logfile.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SurveyInfo;
    use crate::steps::backend::{CoaddRequest, HtmlIndexRequest, PlotRequest, RefcatRequest};
    use crate::testing::galaxy;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};

    /// `(galaxy, galaxy_dir, bands, refband, sky_tests, clobber, logfile)` per call.
    type EllipseCall = (String, PathBuf, [&'static str; 3], &'static str, bool, bool, Option<PathBuf>);

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<EllipseCall>>,
    }

    impl ImagingBackend for Recorder {
        fn build_custom_coadds(&self, _: &CoaddRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
            unreachable!()
        }
        fn build_ellipse(&self, request: &EllipseRequest<'_>, logfile: Option<&Path>) -> Result<(), StepError> {
            self.calls.lock().push((
                request.galaxy.galaxy.clone(),
                request.galaxy_dir.to_path_buf(),
                request.bands,
                request.refband,
                request.sky_tests,
                request.clobber,
                logfile.map(Path::to_path_buf),
            ));
            Ok(())
        }
        fn build_html_plots(&self, _: &PlotRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
            unreachable!()
        }
        fn build_html_index(&self, _: &HtmlIndexRequest<'_>) -> Result<(), StepError> {
            unreachable!()
        }
        fn write_reference_catalog(&self, _: &RefcatRequest<'_>) -> Result<(), StepError> {
            unreachable!()
        }
    }

    fn survey() -> SurveyInfo {
        SurveyInfo {
            run: "south".into(),
            output_dir: PathBuf::from("/data"),
        }
    }

    #[test]
    fn request_carries_galaxy_dir_and_options() {
        let g = galaxy("NGC5");
        let dir = PathBuf::from("/data/NGC5");
        let ctx = StepContext::new(3, &g, dir.clone(), "ellipse", 2, true, survey());

        let backend = Arc::new(Recorder::default());
        let options = RunOptions {
            sky_tests: true,
            clobber: true,
            debug: true,
            ..RunOptions::default()
        };
        BuildEllipse::new(options, backend.clone()).run(&ctx).unwrap();

        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 1);
        let (name, galaxy_dir, bands, refband, sky_tests, clobber, logfile) = &calls[0];
        assert_eq!(name, "NGC5");
        assert_eq!(galaxy_dir, &dir);
        assert_eq!(bands, &["g", "r", "z"]);
        assert_eq!(*refband, "r");
        assert!(*sky_tests);
        assert!(*clobber);
        assert_eq!(logfile.as_deref(), Some(dir.join("NGC5-ellipse-rank2.log").as_path()));
    }

    #[test]
    fn backend_failure_is_returned() {
        struct Failing;
        impl ImagingBackend for Failing {
            fn build_custom_coadds(&self, _: &CoaddRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
                unreachable!()
            }
            fn build_ellipse(&self, _: &EllipseRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
                Err(StepError::Backend {
                    stage: "ellipse",
                    message: "no coadds".into(),
                })
            }
            fn build_html_plots(&self, _: &PlotRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
                unreachable!()
            }
            fn build_html_index(&self, _: &HtmlIndexRequest<'_>) -> Result<(), StepError> {
                unreachable!()
            }
            fn write_reference_catalog(&self, _: &RefcatRequest<'_>) -> Result<(), StepError> {
                unreachable!()
            }
        }

        let g = galaxy("NGC6");
        let ctx = StepContext::new(0, &g, PathBuf::from("/data/NGC6"), "ellipse", 0, false, survey());
        let err = BuildEllipse::new(RunOptions::default(), Arc::new(Failing)).run(&ctx).unwrap_err();
        assert!(matches!(err, StepError::Backend { stage: "ellipse", .. }));
    }
}
