//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the galaxy sample (`Galaxy`, `Sample`) and step selection (`StepKind`)
//! - run options and the environment-derived `PipelineConfig`
//! - Sersic fit outputs (`FitResult`, `FittedParam`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
