//! Shared fixtures for the distribution tests.

use std::path::Path;

use parking_lot::Mutex;

use crate::domain::{Galaxy, Sample, StepKind};
use crate::error::StepError;
use crate::steps::backend::{
    CoaddRequest, EllipseRequest, HtmlIndexRequest, ImagingBackend, PlotRequest, RefcatRequest,
};
use crate::steps::{GalaxyStep, SampleStep, StepContext};

pub(crate) fn galaxy(name: &str) -> Galaxy {
    Galaxy {
        galaxy: name.to_string(),
        id: 0,
        ra: 180.0,
        dec: 10.0,
        diam: 30.0,
        mag: Some(16.0),
        z: Some(0.01),
        extra: Default::default(),
    }
}

/// `G0`, `G1`, ...
pub(crate) fn sample(n: usize) -> Sample {
    Sample::new((0..n).map(|i| galaxy(&format!("G{i}"))).collect())
}

/// Backend whose stages all succeed without doing anything.
pub(crate) struct NoopBackend;

impl ImagingBackend for NoopBackend {
    fn build_custom_coadds(&self, _: &CoaddRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
        Ok(())
    }
    fn build_ellipse(&self, _: &EllipseRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
        Ok(())
    }
    fn build_html_plots(&self, _: &PlotRequest<'_>, _: Option<&Path>) -> Result<(), StepError> {
        Ok(())
    }
    fn build_html_index(&self, _: &HtmlIndexRequest<'_>) -> Result<(), StepError> {
        Ok(())
    }
    fn write_reference_catalog(&self, _: &RefcatRequest<'_>) -> Result<(), StepError> {
        Ok(())
    }
}

/// Step that records what it ran and fails for the listed galaxies.
pub(crate) struct ScriptedStep {
    pub kind: StepKind,
    pub fail: Vec<String>,
    /// `(rank, index, galaxy)` per call.
    pub calls: Mutex<Vec<(usize, usize, String)>>,
}

impl ScriptedStep {
    pub fn new(kind: StepKind, fail: &[&str]) -> Self {
        Self {
            kind,
            fail: fail.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn galaxies_run(&self) -> Vec<String> {
        let mut names: Vec<String> = self.calls.lock().iter().map(|(_, _, g)| g.clone()).collect();
        names.sort();
        names
    }
}

impl GalaxyStep for ScriptedStep {
    fn kind(&self) -> StepKind {
        self.kind
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        self.calls.lock().push((ctx.rank, ctx.index, ctx.name().to_string()));
        if self.fail.iter().any(|f| f == ctx.name()) {
            return Err(StepError::Backend {
                stage: "scripted",
                message: format!("{} is scripted to fail", ctx.name()),
            });
        }
        Ok(())
    }
}

/// Serial step that counts its runs.
pub(crate) struct CountingSerialStep {
    pub kind: StepKind,
    pub runs: Mutex<usize>,
}

impl SampleStep for CountingSerialStep {
    fn kind(&self) -> StepKind {
        self.kind
    }

    fn run(&self, _sample: &Sample) -> Result<(), StepError> {
        *self.runs.lock() += 1;
        Ok(())
    }
}
