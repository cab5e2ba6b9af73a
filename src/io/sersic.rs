//! Read/write Sersic fit results.
//!
//! One JSON file per galaxy and model variant: `{galaxy}-sersic-{modeltype}.json`
//! in the galaxy directory. Files are written to a temporary name and renamed
//! into place, so readers never see a partial result.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::FitResult;
use crate::error::StepError;

pub fn sersic_path(galaxy: &str, galaxy_dir: &Path, modeltype: &str) -> PathBuf {
    galaxy_dir.join(format!("{galaxy}-sersic-{modeltype}.json"))
}

/// Write `result` and return the final path.
pub fn write_sersic(galaxy: &str, galaxy_dir: &Path, result: &FitResult) -> Result<PathBuf, StepError> {
    let path = sersic_path(galaxy, galaxy_dir, &result.modeltype);
    let tmp = path.with_extension("json.tmp");

    let file = File::create(&tmp).map_err(|e| StepError::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, result).map_err(|source| StepError::Serialize {
        what: "Sersic fit result",
        source,
    })?;
    writer.flush().map_err(|e| StepError::io(&tmp, e))?;
    drop(writer);

    std::fs::rename(&tmp, &path).map_err(|e| StepError::io(&path, e))?;
    Ok(path)
}

/// Read a previously written result; `Ok(None)` if it does not exist.
pub fn read_sersic(galaxy: &str, galaxy_dir: &Path, modeltype: &str) -> Result<Option<FitResult>, StepError> {
    let path = sersic_path(galaxy, galaxy_dir, modeltype);
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StepError::io(path, e)),
    };
    let result = serde_json::from_reader(BufReader::new(file)).map_err(|source| StepError::Parse { path, source })?;
    Ok(Some(result))
}
