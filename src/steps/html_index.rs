//! Sample-wide HTML index (serial).

use std::sync::Arc;

use tracing::info;

use crate::domain::{PipelineConfig, RunOptions, Sample, StepKind};
use crate::error::StepError;
use crate::steps::SampleStep;
use crate::steps::backend::{HtmlIndexRequest, ImagingBackend};

pub struct BuildHtmlIndex {
    config: PipelineConfig,
    options: RunOptions,
    backend: Arc<dyn ImagingBackend>,
}

impl BuildHtmlIndex {
    pub fn new(config: PipelineConfig, options: RunOptions, backend: Arc<dyn ImagingBackend>) -> Self {
        Self {
            config,
            options,
            backend,
        }
    }
}

impl SampleStep for BuildHtmlIndex {
    fn kind(&self) -> StepKind {
        StepKind::HtmlIndex
    }

    fn run(&self, sample: &Sample) -> Result<(), StepError> {
        info!(
            galaxies = sample.len(),
            html_dir = %self.config.html_dir.display(),
            "Building HTML index"
        );
        let request = HtmlIndexRequest {
            sample: sample.rows(),
            html_dir: &self.config.html_dir,
            data_dir: &self.config.data_dir,
            pixscale: self.options.pixscale,
            nproc: self.options.nproc,
            clobber: self.options.clobber,
            verbose: self.options.verbose,
        };
        self.backend.build_html_index(&request)
    }
}
