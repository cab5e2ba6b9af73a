//! `legacyhalos` library crate.
//!
//! The binary (`sv3-mpi`) is a thin wrapper around this library so that:
//!
//! - the distribution engine and the fits are testable without spawning processes
//! - ranks can be threads (`LocalGroup`) in tests and processes (`TcpGroup`) in production
//! - the imaging backend stays behind a trait

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod mpi;
pub mod report;
pub mod steps;

#[cfg(test)]
pub(crate) mod testing;
