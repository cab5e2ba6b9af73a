//! Command-line parsing for the `sv3-mpi` pipeline driver.
//!
//! Parsing stays separate from orchestration: the flags are turned into
//! `StepFlags`, `RunOptions` and a `SampleSelection` here and nothing below
//! `app` sees clap types.

use std::path::PathBuf;

use clap::Parser;

use crate::domain::{RunOptions, SampleSelection, SersicOptions};
use crate::steps::StepFlags;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "sv3-mpi",
    version,
    about = "Distributed galaxy-sample pipeline: coadds, ellipse fits, Sersic fits and HTML"
)]
pub struct Cli {
    /// Number of cores per rank handed to the imaging backend.
    #[arg(long, default_value_t = 1)]
    pub nproc: usize,

    /// Pixel scale [arcsec/pixel].
    #[arg(long, default_value_t = 0.262)]
    pub pixscale: f64,

    /// Index of the first sample row to process (inclusive).
    #[arg(long)]
    pub first: Option<usize>,

    /// Index of the last sample row to process (inclusive).
    #[arg(long)]
    pub last: Option<usize>,

    /// Only process these galaxies.
    #[arg(long, num_args = 1.., value_name = "GALAXY")]
    pub galaxylist: Option<Vec<String>>,

    /// Sample file (defaults to the file under the base directory).
    #[arg(long, value_name = "JSON")]
    pub fname: Option<PathBuf>,

    /// Build the custom coadds.
    #[arg(long)]
    pub coadds: bool,

    /// Do the ellipse fitting.
    #[arg(long)]
    pub ellipse: bool,

    /// Build the per-galaxy HTML plots.
    #[arg(long)]
    pub htmlplots: bool,

    /// Fit the Sersic model suite to the ellipse profiles.
    #[arg(long)]
    pub sersic: bool,

    /// Build the HTML index (serial).
    #[arg(long)]
    pub htmlindex: bool,

    /// Build the pipeline reference catalog (serial).
    #[arg(long = "build-refcat")]
    pub build_refcat: bool,

    /// Only build the coadds, skipping model images and sky tests.
    #[arg(long = "just-coadds")]
    pub just_coadds: bool,

    /// Include unWISE coadds.
    #[arg(long)]
    pub unwise: bool,

    /// Use the existing imaging pipeline checkpoints if present.
    #[arg(long)]
    pub force: bool,

    /// Remove intermediate files after the coadds.
    #[arg(long)]
    pub cleanup: bool,

    /// Test the sky-subtraction annuli in the ellipse step.
    #[arg(long = "sky-tests")]
    pub sky_tests: bool,

    /// Number of perturbed starting points per Sersic fit.
    #[arg(long, default_value_t = 20)]
    pub nball: usize,

    /// Seed for the Sersic starting-point perturbations.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Minimum surface-brightness uncertainty [mag].
    #[arg(long, default_value_t = 0.1)]
    pub minerr: f64,

    /// Minimum signal-to-noise of a profile point.
    #[arg(long, default_value_t = 1.0)]
    pub snrmin: f64,

    /// Run across the ranks of an MPI-style launch.
    #[arg(long)]
    pub mpi: bool,

    /// Count how many objects are left to process.
    #[arg(long)]
    pub count: bool,

    /// Write per-galaxy logs; with --count, list the work without running it.
    #[arg(long)]
    pub debug: bool,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Overwrite existing output.
    #[arg(long)]
    pub clobber: bool,
}

impl Cli {
    pub fn step_flags(&self) -> StepFlags {
        StepFlags {
            coadds: self.coadds,
            ellipse: self.ellipse,
            htmlplots: self.htmlplots,
            sersic: self.sersic,
            htmlindex: self.htmlindex,
            build_refcat: self.build_refcat,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            nproc: self.nproc,
            pixscale: self.pixscale,
            clobber: self.clobber,
            debug: self.debug,
            verbose: self.verbose,
            count: self.count,
            unwise: self.unwise,
            force: self.force,
            cleanup: self.cleanup,
            just_coadds: self.just_coadds,
            sky_tests: self.sky_tests,
            sersic: SersicOptions {
                nball: self.nball,
                seed: self.seed,
                minerr: self.minerr,
                snrmin: self.snrmin,
                ..SersicOptions::default()
            },
        }
    }

    pub fn selection(&self) -> SampleSelection {
        SampleSelection {
            fname: self.fname.clone(),
            first: self.first,
            last: self.last,
            galaxylist: self.galaxylist.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepKind;
    use crate::steps::StepFactory;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["sv3-mpi", "--coadds"]);
        let options = cli.run_options();
        assert_eq!(options.nproc, 1);
        assert_eq!(options.pixscale, 0.262);
        assert_eq!(options.sersic.nball, 20);
        assert_eq!(options.sersic.minerr, 0.1);
        assert_eq!(options.sersic.chi2fail, 1e6);
        assert!(!cli.mpi);
        assert_eq!(StepFactory::select(&cli.step_flags()).unwrap(), StepKind::Coadds);
    }

    #[test]
    fn selection_and_step_flags() {
        let cli = Cli::parse_from([
            "sv3-mpi",
            "--build-refcat",
            "--first",
            "2",
            "--last",
            "5",
            "--galaxylist",
            "NGC1",
            "NGC2",
            "--seed",
            "9",
        ]);
        let sel = cli.selection();
        assert_eq!(sel.first, Some(2));
        assert_eq!(sel.last, Some(5));
        assert_eq!(sel.galaxylist, Some(vec!["NGC1".to_string(), "NGC2".to_string()]));
        assert_eq!(cli.run_options().sersic.seed, Some(9));
        assert_eq!(StepFactory::select(&cli.step_flags()).unwrap(), StepKind::Refcat);
    }

    #[test]
    fn two_steps_are_rejected_by_the_factory() {
        let cli = Cli::parse_from(["sv3-mpi", "--ellipse", "--sersic"]);
        assert_eq!(StepFactory::select(&cli.step_flags()).unwrap_err().exit_code(), 2);
    }
}
