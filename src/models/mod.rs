//! Sersic model family implementations.
//!
//! One parameter table per model kind plus a shared evaluation routine, so the
//! fitting code can stay generic over the kind.

pub mod model;
pub mod param;

pub use model::*;
pub use param::*;
