//! Top-level orchestration of one pipeline step.

use std::sync::Arc;

use tracing::info;

use crate::data::read_sample;
use crate::domain::{PipelineConfig, RunOptions, Sample, SampleSelection, StepKind};
use crate::error::AppError;
use crate::io::{ArtifactCheck, MarkerFiles};
use crate::mpi::channel::{CollectiveChannel, broadcast};
use crate::mpi::executor::{RankReport, StepExecutor};
use crate::report::suffix_label;
use crate::steps::{GalaxyStep, ImagingBackend, SampleStep, Step, StepFactory, StepFlags};

/// Outcome of `MpiBuilder::run` on one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub kind: StepKind,
    pub sample_size: usize,
    pub rank_count: usize,
    /// Set for distributed steps that had a non-empty sample.
    pub report: Option<RankReport>,
}

pub struct MpiBuilder {
    config: PipelineConfig,
    options: RunOptions,
    selection: SampleSelection,
    flags: StepFlags,
    backend: Arc<dyn ImagingBackend>,
    artifacts: Arc<dyn ArtifactCheck>,
}

impl MpiBuilder {
    /// Completion is tracked with marker files under the data directory.
    pub fn new(
        config: PipelineConfig,
        options: RunOptions,
        selection: SampleSelection,
        flags: StepFlags,
        backend: Arc<dyn ImagingBackend>,
    ) -> Self {
        let artifacts: Arc<dyn ArtifactCheck> = Arc::new(MarkerFiles::new(config.data_dir.clone()));
        Self {
            config,
            options,
            selection,
            flags,
            backend,
            artifacts,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactCheck>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Validate the step selection, then run it on this rank.
    ///
    /// The selection is checked before any collective call, so a usage error
    /// stops every rank the same way.
    pub fn run(&self, channel: &dyn CollectiveChannel) -> Result<RunSummary, AppError> {
        let kind = StepFactory::select(&self.flags)?;
        let step = StepFactory::build(kind, &self.config, &self.options, Arc::clone(&self.backend))?;
        self.run_step(&step, channel)
    }

    pub fn run_step(&self, step: &Step, channel: &dyn CollectiveChannel) -> Result<RunSummary, AppError> {
        match step {
            Step::Distributed(s) => self.run_distributed(s.as_ref(), channel),
            Step::Serial(s) => self.run_serial(s.as_ref(), channel),
        }
    }

    pub fn run_distributed(&self, step: &dyn GalaxyStep, channel: &dyn CollectiveChannel) -> Result<RunSummary, AppError> {
        let sample = self.load_sample(channel)?;
        let mut summary = RunSummary {
            kind: step.kind(),
            sample_size: sample.len(),
            rank_count: channel.size(),
            report: None,
        };
        if sample.is_empty() {
            return Ok(summary);
        }

        let executor = StepExecutor::new(
            step,
            &sample,
            &self.config,
            &self.options,
            self.artifacts.as_ref(),
            self.backend.as_ref(),
        );
        summary.report = Some(executor.run_ranks(channel)?);
        Ok(summary)
    }

    pub fn run_serial(&self, step: &dyn SampleStep, channel: &dyn CollectiveChannel) -> Result<RunSummary, AppError> {
        let sample = self.load_sample(channel)?;
        let summary = RunSummary {
            kind: step.kind(),
            sample_size: sample.len(),
            rank_count: channel.size(),
            report: None,
        };
        if sample.is_empty() {
            return Ok(summary);
        }

        let label = suffix_label(step.kind().suffix());
        if channel.is_root() {
            info!("Building {label} for {} galaxies on rank 0", sample.len());
            step.run(&sample)?;
        } else {
            info!("Rank {}: {label} runs on rank 0 only; nothing to do.", channel.rank());
        }
        Ok(summary)
    }

    /// Rank 0 reads the sample. With several ranks it is broadcast (even when
    /// empty or unreadable) so that no rank is left waiting.
    fn load_sample(&self, channel: &dyn CollectiveChannel) -> Result<Sample, AppError> {
        if channel.is_root() {
            info!(
                base_dir = %self.config.base_dir.display(),
                data_dir = %self.config.data_dir.display(),
                html_dir = %self.config.html_dir.display(),
                "Pipeline directories"
            );
        }

        if channel.size() == 1 {
            let sample = read_sample(&self.config, &self.selection)?;
            if sample.is_empty() {
                info!("Sample is empty; nothing to do.");
            }
            return Ok(sample);
        }

        let sample = if channel.is_root() {
            let read = read_sample(&self.config, &self.selection);
            let shared: Option<Sample> = read.as_ref().ok().cloned();
            broadcast::<Option<Sample>>(channel, Some(&shared))?;
            read?
        } else {
            broadcast::<Option<Sample>>(channel, None)?
                .ok_or_else(|| AppError::runtime("Rank 0 could not read the sample."))?
        };
        if sample.is_empty() {
            info!(rank = channel.rank(), "Sample is empty; nothing to do.");
        }
        Ok(sample)
    }
}
