//! Sersic profile fitting.
//!
//! Responsibilities:
//!
//! - bounded Levenberg–Marquardt least squares (`lm`)
//! - multi-start fits of one model kind to one galaxy (`wave_fit`)
//! - the per-galaxy suite over all model variants (`suite`)

pub mod lm;
pub mod suite;
pub mod wave_fit;

pub use lm::*;
pub use suite::*;
pub use wave_fit::*;
