//! Custom coadds for one galaxy.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::domain::{Galaxy, RunOptions, StepKind};
use crate::error::StepError;
use crate::steps::backend::{CoaddRequest, ImagingBackend};
use crate::steps::{GalaxyStep, StepContext};

pub struct BuildCoadds {
    options: RunOptions,
    backend: Arc<dyn ImagingBackend>,
}

impl BuildCoadds {
    pub fn new(options: RunOptions, backend: Arc<dyn ImagingBackend>) -> Self {
        Self { options, backend }
    }
}

pub fn sample_row_path(galaxy: &str, galaxy_dir: &Path) -> PathBuf {
    galaxy_dir.join(format!("{galaxy}-sample.json"))
}

/// Write the galaxy's own sample row next to its outputs (tmp + rename).
fn write_sample_row(galaxy: &Galaxy, path: &Path) -> Result<(), StepError> {
    let tmp = path.with_extension("json.tmp");
    let file = File::create(&tmp).map_err(|e| StepError::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, galaxy).map_err(|source| StepError::Serialize {
        what: "sample row",
        source,
    })?;
    writer.flush().map_err(|e| StepError::io(&tmp, e))?;
    drop(writer);
    std::fs::rename(&tmp, path).map_err(|e| StepError::io(path, e))
}

impl GalaxyStep for BuildCoadds {
    fn kind(&self) -> StepKind {
        StepKind::Coadds
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let samplefile = sample_row_path(ctx.name(), &ctx.galaxy_dir);
        if self.options.clobber || !samplefile.is_file() {
            write_sample_row(ctx.galaxy, &samplefile)?;
            debug!(path = %samplefile.display(), "Wrote sample row");
        }

        let request = CoaddRequest {
            galaxy: ctx.galaxy,
            galaxy_dir: &ctx.galaxy_dir,
            survey: &ctx.survey,
            radius_mosaic_arcsec: ctx.radius_mosaic_arcsec,
            subsky_radii: ctx.subsky_radii,
            nproc: self.options.nproc,
            pixscale: self.options.pixscale,
            unwise: self.options.unwise,
            force: self.options.force,
            cleanup: self.options.cleanup,
            just_coadds: self.options.just_coadds,
            require_grz: true,
            debug: self.options.debug,
            verbose: self.options.verbose,
        };
        self.backend.build_custom_coadds(&request, ctx.logfile.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SurveyInfo;
    use crate::steps::backend::{EllipseRequest, HtmlIndexRequest, PlotRequest, RefcatRequest};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        radii: Mutex<Vec<f64>>,
    }

    impl ImagingBackend for Recorder {
        fn build_custom_coadds(&self, request: &CoaddRequest<'_>, _logfile: Option<&Path>) -> Result<(), StepError> {
            self.radii.lock().push(request.radius_mosaic_arcsec);
            Ok(())
        }
        fn build_ellipse(&self, _: &EllipseRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
            unreachable!()
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

    #[test]
    fn writes_sample_row_then_calls_backend() {
        let dir = tempfile::tempdir().unwrap();
        let galaxy = Galaxy {
            galaxy: "UGC9".into(),
            id: 9,
            ra: 1.0,
            dec: 2.0,
            diam: 50.0,
            mag: Some(14.0),
            z: None,
            extra: Default::default(),
        };
        let survey = SurveyInfo {
            run: "south".into(),
            output_dir: dir.path().to_path_buf(),
        };
        let ctx = StepContext::new(0, &galaxy, dir.path().to_path_buf(), "coadds", 0, false, survey);

        let backend = Arc::new(Recorder::default());
        let step = BuildCoadds::new(RunOptions::default(), backend.clone());
        step.run(&ctx).unwrap();

        let written: Galaxy =
            serde_json::from_str(&std::fs::read_to_string(sample_row_path("UGC9", dir.path())).unwrap()).unwrap();
        assert_eq!(written, galaxy);
        assert_eq!(*backend.radii.lock(), vec![25.0]);
    }
}
