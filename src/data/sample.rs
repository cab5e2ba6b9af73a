//! Galaxy sample loading.
//!
//! Sample files are JSON arrays of galaxy rows. The selection applies an
//! inclusive `first..=last` row window, then an optional name list; the file
//! order is kept in both cases.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, info};

use crate::domain::{Galaxy, PipelineConfig, Sample, SampleSelection};
use crate::error::AppError;

/// Read the sample named by `selection` (or the configured default file).
pub fn read_sample(config: &PipelineConfig, selection: &SampleSelection) -> Result<Sample, AppError> {
    let path = selection
        .fname
        .clone()
        .unwrap_or_else(|| config.default_sample_file());
    let rows = read_rows(&path)?;
    let nrows = rows.len();
    let sample = select_rows(rows, selection)?;

    info!(
        path = %path.display(),
        selected = sample.len(),
        total = nrows,
        "Read sample"
    );
    Ok(sample)
}

fn read_rows(path: &Path) -> Result<Vec<Galaxy>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(3, format!("Failed to open sample '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(3, format!("Invalid sample JSON '{}': {e}", path.display())))
}

/// Apply the row window and the name list.
pub fn select_rows(rows: Vec<Galaxy>, selection: &SampleSelection) -> Result<Sample, AppError> {
    let nrows = rows.len();
    if nrows == 0 {
        return Ok(Sample::default());
    }

    let first = selection.first.unwrap_or(0);
    let last = selection.last.unwrap_or(nrows - 1);
    if first > last {
        return Err(AppError::config(format!(
            "Index first cannot be greater than index last, {first} > {last}"
        )));
    }
    if last >= nrows {
        return Err(AppError::new(
            3,
            format!("Index last cannot be greater than the number of rows, {last} >= {nrows}"),
        ));
    }

    let mut window: Vec<Galaxy> = rows.into_iter().skip(first).take(last - first + 1).collect();
    debug!(first, last, "Applied row window");

    if let Some(names) = &selection.galaxylist {
        window.retain(|g| names.iter().any(|n| n == &g.galaxy));
        debug!(requested = names.len(), matched = window.len(), "Applied galaxy list");
    }

    Ok(Sample::new(window))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Galaxy> {
        (0..n)
            .map(|i| Galaxy {
                galaxy: format!("G{i}"),
                id: i as i64,
                ra: 150.0,
                dec: 2.0,
                diam: 30.0,
                mag: None,
                z: None,
                extra: Default::default(),
            })
            .collect()
    }

    fn names(sample: &Sample) -> Vec<&str> {
        sample.iter().map(|g| g.galaxy.as_str()).collect()
    }

    #[test]
    fn window_is_inclusive() {
        let sel = SampleSelection {
            first: Some(1),
            last: Some(3),
            ..Default::default()
        };
        let sample = select_rows(rows(5), &sel).unwrap();
        assert_eq!(names(&sample), ["G1", "G2", "G3"]);
    }

    #[test]
    fn galaxylist_keeps_file_order() {
        let sel = SampleSelection {
            galaxylist: Some(vec!["G4".into(), "G0".into(), "missing".into()]),
            ..Default::default()
        };
        let sample = select_rows(rows(5), &sel).unwrap();
        assert_eq!(names(&sample), ["G0", "G4"]);
    }

    #[test]
    fn inverted_window_is_a_config_error() {
        let sel = SampleSelection {
            first: Some(3),
            last: Some(1),
            ..Default::default()
        };
        assert_eq!(select_rows(rows(5), &sel).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn window_past_the_end_is_an_input_error() {
        let sel = SampleSelection {
            last: Some(5),
            ..Default::default()
        };
        assert_eq!(select_rows(rows(5), &sel).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn reads_json_file_with_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(
            &path,
            r#"[{"galaxy": "NGC1", "id": 7, "ra": 10.0, "dec": 40.0, "diam": 60.0, "tileid": 80607}]"#,
        )
        .unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        let sel = SampleSelection {
            fname: Some(path),
            ..Default::default()
        };
        let sample = read_sample(&config, &sel).unwrap();
        assert_eq!(sample.len(), 1);
        let g = sample.get(0).unwrap();
        assert_eq!(g.id, 7);
        assert_eq!(g.extra.get("tileid").and_then(|v| v.as_i64()), Some(80607));
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        let err = read_sample(&config, &SampleSelection::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
