//! Pipeline reference catalog (serial).
//!
//! Writes one row per sample galaxy with a fixed shape (round, 10 arcsec),
//! then builds the kd-tree index the imaging pipeline reads and stamps the
//! catalog version into it. The index tools are best effort: a failure is
//! logged and the step still counts as done.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Sample, StepKind};
use crate::error::StepError;
use crate::steps::SampleStep;
use crate::steps::backend::{ImagingBackend, RefcatRequest, RefcatRow};

/// Catalog version written to the `SGAVER` header keyword.
pub const REFCAT_VERSION: &str = "R1";
/// Fixed reference diameter [arcmin].
const REFCAT_DIAM_ARCMIN: f32 = 10.0 / 60.0;

pub struct BuildRefcat {
    path: PathBuf,
    backend: Arc<dyn ImagingBackend>,
}

impl BuildRefcat {
    pub fn new(path: PathBuf, backend: Arc<dyn ImagingBackend>) -> Self {
        Self { path, backend }
    }
}

/// `<name>.fits` → `<name>.kd.fits`.
pub fn kd_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace(".fits", ".kd.fits"))
}

pub fn refcat_rows(sample: &Sample) -> Vec<RefcatRow> {
    sample
        .iter()
        .map(|g| RefcatRow {
            ra: g.ra,
            dec: g.dec,
            sga_id: g.id,
            mag_leda: g.mag,
            ba: 1.0,
            pa: 0.0,
            diam: REFCAT_DIAM_ARCMIN,
        })
        .collect()
}

fn run_tool(program: &str, args: &[String]) {
    info!("{program} {}", args.join(" "));
    match Command::new(program).args(args).status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(program, %status, "Reference catalog tool failed"),
        Err(e) => warn!(program, error = %e, "Reference catalog tool could not be started"),
    }
}

impl SampleStep for BuildRefcat {
    fn kind(&self) -> StepKind {
        StepKind::Refcat
    }

    fn run(&self, sample: &Sample) -> Result<(), StepError> {
        let rows = refcat_rows(sample);
        info!("Writing {} galaxies to {}", rows.len(), self.path.display());
        self.backend.write_reference_catalog(&RefcatRequest {
            path: &self.path,
            version: REFCAT_VERSION,
            rows: &rows,
        })?;

        let kd = kd_path(&self.path);
        info!("Writing {}", kd.display());
        let reffile = self.path.display().to_string();
        let kdfile = kd.display().to_string();
        run_tool(
            "startree",
            &[
                "-i".into(),
                reffile,
                "-o".into(),
                kdfile.clone(),
                "-T".into(),
                "-P".into(),
                "-k".into(),
                "-n".into(),
                "stars".into(),
            ],
        );
        run_tool("modhead", &[kdfile, "SGAVER".into(), REFCAT_VERSION.into()]);
        Ok(())
    }
}
