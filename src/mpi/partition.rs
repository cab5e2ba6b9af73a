//! Work partitioning across ranks.
//!
//! Rank 0 scans each galaxy's artifact status for the selected step and
//! splits what is left into one contiguous group per rank.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Sample;
use crate::error::AppError;
use crate::io::{ArtifactCheck, ArtifactStatus};

/// Per-rank work for one step, broadcast from rank 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub suffix: String,
    /// Sample indices per rank; disjoint, union is the todo list.
    pub groups: Vec<Vec<usize>>,
    /// Previously failed indices, split the same way.
    pub failures: Vec<Vec<usize>>,
    /// Galaxies already complete.
    pub done: usize,
}

impl WorkAssignment {
    pub fn todo_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.iter().map(Vec::len).sum()
    }

    /// Largest group size: the number of per-galaxy rounds every rank joins.
    pub fn rounds(&self) -> usize {
        self.groups.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn todo(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flatten().copied()
    }

    pub fn all_failures(&self) -> impl Iterator<Item = usize> + '_ {
        self.failures.iter().flatten().copied()
    }
}

/// Plan the work for `suffix` across `rank_count` ranks.
pub fn partition(
    sample: &Sample,
    suffix: &str,
    rank_count: usize,
    clobber_overwrite: bool,
    artifacts: &dyn ArtifactCheck,
) -> Result<WorkAssignment, AppError> {
    if rank_count == 0 {
        return Err(AppError::config("Rank count must be at least 1."));
    }

    let mut todo = Vec::new();
    let mut failed = Vec::new();
    let mut done = 0;

    for (index, galaxy) in sample.iter().enumerate() {
        if clobber_overwrite {
            todo.push(index);
            continue;
        }
        match artifacts.status(galaxy, suffix) {
            ArtifactStatus::Missing => todo.push(index),
            ArtifactStatus::Failed => failed.push(index),
            ArtifactStatus::Done => done += 1,
        }
    }

    debug!(
        suffix,
        todo = todo.len(),
        failed = failed.len(),
        done,
        "Scanned artifacts"
    );

    Ok(WorkAssignment {
        suffix: suffix.to_string(),
        groups: array_split(&todo, rank_count),
        failures: array_split(&failed, rank_count),
        done,
    })
}

/// Split `items` into `parts` contiguous chunks; the first `len % parts`
/// chunks get one extra element.
pub fn array_split(items: &[usize], parts: usize) -> Vec<Vec<usize>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let rem = items.len() % parts;
    let mut out = Vec::with_capacity(parts);
    let mut cursor = 0usize;
    for part in 0..parts {
        let len = base + usize::from(part < rem);
        out.push(items[cursor..cursor + len].to_vec());
        cursor += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Galaxy;
    use crate::error::StepError;
    use std::collections::HashMap;

    struct FixedStatus(HashMap<String, ArtifactStatus>);

    impl ArtifactCheck for FixedStatus {
        fn status(&self, galaxy: &Galaxy, _suffix: &str) -> ArtifactStatus {
            self.0.get(&galaxy.galaxy).copied().unwrap_or(ArtifactStatus::Missing)
        }

        fn record(&self, _galaxy: &Galaxy, _suffix: &str, _status: ArtifactStatus) -> Result<(), StepError> {
            Ok(())
        }
    }

    fn sample(n: usize) -> Sample {
        Sample::new(
            (0..n)
                .map(|i| Galaxy {
                    galaxy: format!("G{i}"),
                    id: i as i64,
                    ra: 0.0,
                    dec: 0.0,
                    diam: 20.0,
                    mag: None,
                    z: None,
                    extra: Default::default(),
                })
                .collect(),
        )
    }

    fn none() -> FixedStatus {
        FixedStatus(HashMap::new())
    }

    #[test]
    fn array_split_matches_numpy() {
        let items: Vec<usize> = (0..10).collect();
        let parts = array_split(&items, 3);
        assert_eq!(parts, vec![vec![0, 1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);

        let few = array_split(&[5, 6], 4);
        assert_eq!(few, vec![vec![5], vec![6], vec![], vec![]]);
    }

    #[test]
    fn groups_cover_the_todo_list_exactly_once() {
        for n in [0, 1, 7, 16, 33] {
            for ranks in 1..=6 {
                let plan = partition(&sample(n), "coadds", ranks, false, &none()).unwrap();
                assert_eq!(plan.groups.len(), ranks);
                let mut all: Vec<usize> = plan.todo().collect();
                assert_eq!(all.len(), n);
                all.sort_unstable();
                all.dedup();
                assert_eq!(all, (0..n).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn status_decides_todo_unless_clobbering() {
        let status = FixedStatus(
            [
                ("G0".to_string(), ArtifactStatus::Done),
                ("G2".to_string(), ArtifactStatus::Failed),
            ]
            .into_iter()
            .collect(),
        );

        let plan = partition(&sample(4), "ellipse", 2, false, &status).unwrap();
        assert_eq!(plan.todo().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(plan.all_failures().collect::<Vec<_>>(), vec![2]);
        assert_eq!(plan.done, 1);

        let clobber = partition(&sample(4), "ellipse", 2, true, &status).unwrap();
        assert_eq!(clobber.todo_count(), 4);
        assert_eq!(clobber.failure_count(), 0);
    }

    #[test]
    fn completed_group_drops_out_of_the_next_plan() {
        let dir = tempfile::tempdir().unwrap();
        let markers = crate::io::MarkerFiles::new(dir.path());
        let sample = sample(7);

        let first = partition(&sample, "coadds", 3, false, &markers).unwrap();
        let finished = first.groups[1].clone();
        assert_eq!(finished, vec![3, 4]);
        for &i in &finished {
            markers.record(&sample.rows()[i], "coadds", ArtifactStatus::Done).unwrap();
        }

        let rerun = partition(&sample, "coadds", 3, false, &markers).unwrap();
        let todo: Vec<usize> = rerun.todo().collect();
        assert_eq!(todo, vec![0, 1, 2, 5, 6]);
        assert_eq!(rerun.done, 2);

        let clobber = partition(&sample, "coadds", 3, true, &markers).unwrap();
        assert_eq!(clobber.todo().collect::<Vec<_>>(), (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn planning_is_deterministic() {
        let a = partition(&sample(11), "html", 4, false, &none()).unwrap();
        let b = partition(&sample(11), "html", 4, false, &none()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rounds(), 3);
    }

    #[test]
    fn zero_ranks_is_a_config_error() {
        let err = partition(&sample(3), "coadds", 0, false, &none()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
