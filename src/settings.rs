//! Filesystem locations for a run.
//!
//! Resolution order for each path: explicit value, then environment (a `.env`
//! file is honoured through `dotenvy`), then the built-in default.

use std::path::{Path, PathBuf};

pub const DATASET_PATH_VAR: &str = "WASTE_DATASET_PATH";
pub const ARTIFACT_DIR_VAR: &str = "WASTE_ARTIFACT_DIR";
pub const REPORT_DIR_VAR: &str = "WASTE_REPORT_DIR";

pub const DEFAULT_DATASET_DIR: &str = "dataset";
pub const DEFAULT_ARTIFACT_DIR: &str = "plastic_paper_garbage_classification_model";
pub const DEFAULT_REPORT_DIR: &str = "reports";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root holding one subdirectory per class.
    pub dataset_dir: PathBuf,
    /// Directory the trained model artifact is written to and read from.
    pub artifact_dir: PathBuf,
    /// Directory for the rendered learning curves.
    pub report_dir: PathBuf,
}

impl Settings {
    pub fn new(
        dataset_dir: impl AsRef<Path>,
        artifact_dir: impl AsRef<Path>,
        report_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            dataset_dir: dataset_dir.as_ref().to_path_buf(),
            artifact_dir: artifact_dir.as_ref().to_path_buf(),
            report_dir: report_dir.as_ref().to_path_buf(),
        }
    }

    /// Fills every path not given explicitly from the environment or the defaults.
    pub fn resolve(
        dataset_dir: Option<PathBuf>,
        artifact_dir: Option<PathBuf>,
        report_dir: Option<PathBuf>,
    ) -> Self {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                log::warn!("ignoring unreadable .env file: {err}");
            }
        }

        Self {
            dataset_dir: dataset_dir.unwrap_or_else(|| from_env(DATASET_PATH_VAR, DEFAULT_DATASET_DIR)),
            artifact_dir: artifact_dir
                .unwrap_or_else(|| from_env(ARTIFACT_DIR_VAR, DEFAULT_ARTIFACT_DIR)),
            report_dir: report_dir.unwrap_or_else(|| from_env(REPORT_DIR_VAR, DEFAULT_REPORT_DIR)),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_DATASET_DIR, DEFAULT_ARTIFACT_DIR, DEFAULT_REPORT_DIR)
    }
}

fn from_env(key: &str, default: &str) -> PathBuf {
    dotenvy::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
