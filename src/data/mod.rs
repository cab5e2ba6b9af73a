//! Pipeline inputs: the galaxy sample and the per-galaxy ellipse profiles.

pub mod ellipse;
pub mod sample;

pub use ellipse::*;
pub use sample::*;
