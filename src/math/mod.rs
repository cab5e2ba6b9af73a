//! Mathematical utilities: special functions, PSF smoothing, least squares.

pub mod convolve;
pub mod gamma;
pub mod ols;

pub use convolve::*;
pub use gamma::*;
pub use ols::*;
