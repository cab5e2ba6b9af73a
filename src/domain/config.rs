//! Environment-derived pipeline configuration.
//!
//! All directory and catalog locations are resolved once, at startup, into a
//! `PipelineConfig` that is passed down explicitly. Nothing below `app` reads
//! the process environment.

use std::path::PathBuf;

use crate::error::AppError;

pub const ENV_BASE_DIR: &str = "LEGACYHALOS_DIR";
pub const ENV_DATA_DIR: &str = "LEGACYHALOS_DATA_DIR";
pub const ENV_HTML_DIR: &str = "LEGACYHALOS_HTML_DIR";
pub const ENV_REFCAT: &str = "LARGEGALAXIES_CAT";
pub const ENV_BACKEND: &str = "LEGACYHALOS_BACKEND";

const DEFAULT_BACKEND: &str = "legacyhalos-backend";
const DEFAULT_SAMPLE_FILE: &str = "sample/sv3-sample.json";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub html_dir: PathBuf,
    /// Reference catalog output path; only required by the refcat step.
    pub refcat_path: Option<PathBuf>,
    /// Executable implementing the imaging backend stages.
    pub backend_program: String,
}

impl PipelineConfig {
    /// Load `.env` (if any) and resolve the configuration from the environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_dir = non_empty(ENV_BASE_DIR)
            .map(PathBuf::from)
            .ok_or_else(|| AppError::config(format!("Missing {ENV_BASE_DIR} in environment (.env).")))?;
        let data_dir = non_empty(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.clone());
        let html_dir = non_empty(ENV_HTML_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("html"));

        Ok(Self {
            base_dir,
            data_dir,
            html_dir,
            refcat_path: non_empty(ENV_REFCAT).map(PathBuf::from),
            backend_program: non_empty(ENV_BACKEND).unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
        })
    }

    /// Configuration rooted at a single directory (tests, local runs).
    pub fn rooted_at(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            data_dir: base_dir.clone(),
            html_dir: base_dir.join("html"),
            refcat_path: None,
            backend_program: DEFAULT_BACKEND.to_string(),
            base_dir,
        }
    }

    pub fn default_sample_file(&self) -> PathBuf {
        self.base_dir.join(DEFAULT_SAMPLE_FILE)
    }

    /// Per-galaxy output directory.
    pub fn galaxy_dir(&self, galaxy: &str) -> PathBuf {
        self.data_dir.join(galaxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn base_dir_is_required() {
        let err = PipelineConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn data_and_html_dirs_default_from_base() {
        let cfg = PipelineConfig::from_lookup(lookup_from(&[(ENV_BASE_DIR, "/lh")])).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/lh"));
        assert_eq!(cfg.html_dir, PathBuf::from("/lh/html"));
        assert_eq!(cfg.refcat_path, None);
        assert_eq!(cfg.backend_program, "legacyhalos-backend");
    }

    #[test]
    fn explicit_values_win() {
        let cfg = PipelineConfig::from_lookup(lookup_from(&[
            (ENV_BASE_DIR, "/lh"),
            (ENV_DATA_DIR, "/scratch/data"),
            (ENV_HTML_DIR, "/www"),
            (ENV_REFCAT, "/cat/sga.fits"),
            (ENV_BACKEND, "lh-backend"),
        ]))
        .unwrap();
        assert_eq!(cfg.galaxy_dir("NGC0001"), PathBuf::from("/scratch/data/NGC0001"));
        assert_eq!(cfg.html_dir, PathBuf::from("/www"));
        assert_eq!(cfg.refcat_path, Some(PathBuf::from("/cat/sga.fits")));
        assert_eq!(cfg.backend_program, "lh-backend");
    }
}
