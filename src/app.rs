//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - resolves the pipeline configuration from the environment
//! - joins the rank group (or runs as a single rank)
//! - hands the selected step to `MpiBuilder`

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::domain::PipelineConfig;
use crate::error::AppError;
use crate::mpi::{LaunchInfo, MpiBuilder, SingleRank, TcpGroup};
use crate::report::format_run_summary;
use crate::steps::{CommandBackend, ImagingBackend, StepFactory};

/// Entry point for the `sv3-mpi` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Usage errors must stop every rank before any of them joins the group.
    let kind = StepFactory::select(&cli.step_flags())?;
    let config = PipelineConfig::from_env()?;
    let backend: Arc<dyn ImagingBackend> = Arc::new(CommandBackend::new(config.backend_program.clone()));
    let builder = MpiBuilder::new(config, cli.run_options(), cli.selection(), cli.step_flags(), backend);

    let summary = if cli.mpi {
        let launch = LaunchInfo::from_lookup(|key| std::env::var(key).ok())?;
        info!(rank = launch.rank, size = launch.size, addr = %launch.addr, step = ?kind, "Joining rank group");
        let group = TcpGroup::join(&launch)?;
        builder.run(&group)?
    } else {
        builder.run(&SingleRank)?
    };

    info!("{}", format_run_summary(&summary).trim_end());
    Ok(())
}

/// `RUST_LOG` wins; otherwise info (debug with `--verbose`) for this crate.
fn init_tracing(verbose: bool) {
    let default = if verbose { "legacyhalos=debug,info" } else { "legacyhalos=info,warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
