//! Input/output helpers.
//!
//! - completion markers (`markers`)
//! - Sersic fit result JSON read/write (`sersic`)

pub mod markers;
pub mod sersic;

pub use markers::*;
pub use sersic::*;
