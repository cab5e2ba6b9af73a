//! Per-rank execution of a distributed step.
//!
//! Every rank runs the same sequence of collectives:
//!
//! 1. broadcast of the `WorkAssignment` planned on rank 0
//! 2. one barrier after planning
//! 3. one barrier per round, where `rounds` is the largest group size
//!
//! Ranks with fewer galaxies (or none) still enter every round's barrier, so
//! uneven splits never leave a rank waiting. Dry runs (`--count --debug`)
//! skip the rounds on every rank alike.

use std::time::Instant;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::domain::{PipelineConfig, RunOptions, Sample};
use crate::error::{AppError, StepError};
use crate::io::{ArtifactCheck, ArtifactStatus};
use crate::mpi::channel::{CollectiveChannel, broadcast};
use crate::mpi::partition::{WorkAssignment, partition};
use crate::report::{list_indices, suffix_label};
use crate::steps::backend::ImagingBackend;
use crate::steps::{GalaxyStep, StepContext};

/// What one rank did with its share of the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankReport {
    pub rank: usize,
    pub suffix: String,
    pub assigned: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct StepExecutor<'a> {
    step: &'a dyn GalaxyStep,
    sample: &'a Sample,
    config: &'a PipelineConfig,
    options: &'a RunOptions,
    artifacts: &'a dyn ArtifactCheck,
    backend: &'a dyn ImagingBackend,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        step: &'a dyn GalaxyStep,
        sample: &'a Sample,
        config: &'a PipelineConfig,
        options: &'a RunOptions,
        artifacts: &'a dyn ArtifactCheck,
        backend: &'a dyn ImagingBackend,
    ) -> Self {
        Self {
            step,
            sample,
            config,
            options,
            artifacts,
            backend,
        }
    }

    pub fn run_ranks(&self, channel: &dyn CollectiveChannel) -> Result<RankReport, AppError> {
        let rank = channel.rank();
        let size = channel.size();
        let suffix = self.step.kind().suffix();
        let label = suffix_label(suffix);
        let ntotal = self.sample.len();

        let plan = if channel.is_root() {
            Some(partition(
                self.sample,
                suffix,
                size,
                self.options.clobber,
                self.artifacts,
            )?)
        } else {
            None
        };
        let assignment: WorkAssignment = broadcast(channel, plan.as_ref())?;
        let ntodo = assignment.todo_count();

        if channel.is_root() {
            info!("{label} left to do: {ntodo} / {ntotal} divided across {size} rank(s).");
        }
        channel.barrier()?;

        let my_group: &[usize] = assignment.groups.get(rank).map(Vec::as_slice).unwrap_or(&[]);
        let dry_run = self.options.count && self.options.debug;
        let mut report = RankReport {
            rank,
            suffix: suffix.to_string(),
            assigned: my_group.len(),
            completed: 0,
            failed: 0,
        };

        if my_group.is_empty() {
            info!("{label} for all {ntotal} galaxies on rank {rank} are complete!");
        } else {
            info!("Rank {rank}: {} galaxies left to do.", my_group.len());
        }

        if dry_run {
            if channel.is_root() {
                self.log_listing(&label, "failures", assignment.all_failures());
                if !my_group.is_empty() {
                    self.log_listing(&label, "todo", assignment.todo());
                }
            }
            return Ok(report);
        }

        let rounds = assignment.rounds();
        if my_group.is_empty() {
            for _ in 0..rounds {
                channel.barrier()?;
            }
            return Ok(report);
        }

        info!(
            "Starting {} {label} on rank {rank} with {} cores on {}",
            my_group.len(),
            self.options.nproc,
            Local::now().format("%a %b %e %H:%M:%S %Y")
        );
        let started = Instant::now();

        for round in 0..rounds {
            if let Some(&index) = my_group.get(round) {
                match self.process(rank, round, my_group.len(), index) {
                    Ok(()) => report.completed += 1,
                    Err(err) => {
                        report.failed += 1;
                        let galaxy = self.sample.get(index).map(|g| g.galaxy.as_str()).unwrap_or("?");
                        error!(rank, index, galaxy, error = %err, "{label} failed");
                    }
                }
            }
            debug!("Rank {rank} waiting at barrier.");
            channel.barrier()?;
        }

        if channel.is_root() {
            let minutes = started.elapsed().as_secs_f64() / 60.0;
            info!(
                "Finished {ntodo} {label} at {} after {minutes:.3} minutes",
                Local::now().format("%a %b %e %H:%M:%S %Y")
            );
            match partition(self.sample, suffix, size, false, self.artifacts) {
                Ok(after) => info!("{label} left to do: {} / {ntodo}.", after.todo_count()),
                Err(err) => warn!(error = %err, "Could not rescan outstanding work"),
            }
        }

        Ok(report)
    }

    /// Run the step for one galaxy and record the outcome marker.
    fn process(&self, rank: usize, round: usize, count: usize, index: usize) -> Result<(), StepError> {
        let galaxy = self.sample.get(index).ok_or_else(|| StepError::Backend {
            stage: "assignment",
            message: format!("index {index} is outside the sample"),
        })?;
        let galaxy_dir = self.config.galaxy_dir(&galaxy.galaxy);
        std::fs::create_dir_all(&galaxy_dir).map_err(|e| StepError::io(&galaxy_dir, e))?;

        info!(
            "Rank {rank:03} ({} / {count}): {} (index {index})",
            round + 1,
            galaxy_dir.display()
        );

        let suffix = self.step.kind().suffix();
        let outcome = self.backend.survey(galaxy, &galaxy_dir).and_then(|survey| {
            let ctx = StepContext::new(index, galaxy, galaxy_dir.clone(), suffix, rank, self.options.debug, survey);
            self.step.run(&ctx)
        });

        let status = match outcome {
            Ok(()) => ArtifactStatus::Done,
            Err(_) => ArtifactStatus::Failed,
        };
        if let Err(err) = self.artifacts.record(galaxy, suffix, status) {
            warn!(rank, index, galaxy = %galaxy.galaxy, error = %err, "Could not write completion marker");
        }
        outcome
    }

    fn log_listing(&self, label: &str, what: &str, indices: impl Iterator<Item = usize>) {
        let indices: Vec<usize> = indices.collect();
        if indices.is_empty() {
            return;
        }
        info!("{label} {what}: {} / {}", indices.len(), self.sample.len());
        for line in list_indices(self.sample, self.config, &indices) {
            info!("{line}");
        }
    }
}
