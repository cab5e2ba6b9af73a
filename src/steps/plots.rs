//! Per-galaxy QA plots for the web pages.

use std::sync::Arc;

use crate::domain::{PipelineConfig, RunOptions, StepKind};
use crate::error::StepError;
use crate::steps::backend::{ImagingBackend, PlotRequest};
use crate::steps::{GalaxyStep, StepContext};

const BAR_ARCSEC: f64 = 30.0;
const BAR_LABEL: &str = "30 arcsec";

/// Scale bar length [pixels] for a `BAR_ARCSEC` bar.
pub fn barlen(pixscale: f64) -> u32 {
    (BAR_ARCSEC / pixscale).ceil() as u32
}

pub struct BuildPlots {
    config: PipelineConfig,
    options: RunOptions,
    backend: Arc<dyn ImagingBackend>,
}

impl BuildPlots {
    pub fn new(config: PipelineConfig, options: RunOptions, backend: Arc<dyn ImagingBackend>) -> Self {
        Self {
            config,
            options,
            backend,
        }
    }
}

impl GalaxyStep for BuildPlots {
    fn kind(&self) -> StepKind {
        StepKind::HtmlPlots
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let request = PlotRequest {
            galaxy: ctx.galaxy,
            galaxy_dir: &ctx.galaxy_dir,
            survey: &ctx.survey,
            html_dir: &self.config.html_dir,
            data_dir: &self.config.data_dir,
            pixscale: self.options.pixscale,
            nproc: self.options.nproc,
            barlen: barlen(self.options.pixscale),
            barlabel: BAR_LABEL,
            radius_mosaic_arcsec: ctx.radius_mosaic_arcsec,
            just_coadds: self.options.just_coadds,
            clobber: self.options.clobber,
            debug: self.options.debug,
            verbose: self.options.verbose,
        };
        self.backend.build_html_plots(&request, ctx.logfile.as_deref())
    }
}
