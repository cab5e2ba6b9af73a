//! Sersic fitting suite as a distributed step.

use tracing::info;

use crate::domain::{SersicOptions, StepKind};
use crate::error::StepError;
use crate::fit::{SuiteOutcome, fit_sersic_suite};
use crate::steps::{GalaxyStep, StepContext};

pub struct BuildSersic {
    options: SersicOptions,
}

impl BuildSersic {
    pub fn new(options: SersicOptions) -> Self {
        Self { options }
    }
}

impl GalaxyStep for BuildSersic {
    fn kind(&self) -> StepKind {
        StepKind::Sersic
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let outcome = fit_sersic_suite(ctx.name(), &ctx.galaxy_dir, &self.options)?;
        match &outcome {
            SuiteOutcome::NothingToDo => info!(galaxy = ctx.name(), "Sersic: nothing to do"),
            SuiteOutcome::Fitted { single_success, written } => info!(
                galaxy = ctx.name(),
                results = written.len(),
                single_success,
                "Sersic fits written"
            ),
        }
        Ok(())
    }
}
