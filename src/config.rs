use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

use crate::error::IndexingError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Where uploaded PDFs live. Each indexed document also owns an artifact
/// directory `<root>/<file_ref>.d/`.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

/// Suffix that turns a file reference into its artifact directory name.
const ARTIFACT_SUFFIX: &str = ".d";

impl StorageConfig {
    /// A file reference must be a non-empty relative path made only of
    /// normal components: no root, no drive prefix, no `.` or `..`.
    pub fn check_ref(file_ref: &str) -> Result<(), IndexingError> {
        let normal = Path::new(file_ref)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if file_ref.is_empty() || !normal {
            return Err(IndexingError::InvalidRef(file_ref.to_string()));
        }
        Ok(())
    }

    fn join_checked(&self, rel: &str) -> Result<PathBuf, IndexingError> {
        let path = self.root.join(rel);
        if !path.starts_with(&self.root) {
            return Err(IndexingError::InvalidRef(rel.to_string()));
        }
        Ok(path)
    }

    pub fn source_path(&self, file_ref: &str) -> Result<PathBuf, IndexingError> {
        Self::check_ref(file_ref)?;
        self.join_checked(file_ref)
    }

    /// `report.pdf` -> `<root>/report.pdf.d`, `sub/x` -> `<root>/sub/x.d`.
    pub fn artifact_dir(&self, file_ref: &str) -> Result<PathBuf, IndexingError> {
        Self::check_ref(file_ref)?;
        self.join_checked(&format!("{}{}", file_ref, ARTIFACT_SUFFIX))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    #[serde(default = "default_ratio")]
    pub ratio: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            ratio: default_ratio(),
        }
    }
}

fn default_ratio() -> f64 {
    crate::cluster::DEFAULT_RATIO
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// 0 disables the per-task timeout.
    #[serde(default)]
    pub task_timeout_secs: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            task_timeout_secs: 0,
            progress_every: default_progress_every(),
        }
    }
}

fn default_max_workers() -> usize {
    2
}
fn default_progress_every() -> u32 {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_final_limit() -> i64 {
    20
}
fn default_similarity_threshold() -> f64 {
    crate::highlight::DEFAULT_THRESHOLD
}

impl Config {
    /// Default configuration with the database and upload root under `dir`.
    pub fn for_root(dir: &Path) -> Self {
        Self {
            db: DbConfig {
                path: dir.join("data").join("sift.sqlite"),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            storage: StorageConfig {
                root: dir.join("files"),
            },
            clustering: ClusteringConfig::default(),
            queue: QueueConfig::default(),
            search: SearchConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.clustering.ratio > 0.0) {
            anyhow::bail!("clustering.ratio must be > 0");
        }
        if self.queue.max_workers == 0 {
            anyhow::bail!("queue.max_workers must be >= 1");
        }
        if self.queue.progress_every == 0 {
            anyhow::bail!("queue.progress_every must be >= 1");
        }
        if self.search.final_limit < 1 {
            anyhow::bail!("search.final_limit must be >= 1");
        }
        let t = self.search.similarity_threshold;
        if !(t > 0.0 && t <= 1.0) {
            anyhow::bail!("search.similarity_threshold must be in (0.0, 1.0]");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/sift.sqlite"

            [storage]
            root = "/tmp/files"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.db.busy_timeout_ms, 5000);
        assert_eq!(config.clustering.ratio, 50.0);
        assert_eq!(config.queue.max_workers, 2);
        assert_eq!(config.queue.task_timeout_secs, 0);
        assert_eq!(config.queue.progress_every, 25);
        assert_eq!(config.search.final_limit, 20);
        assert!((config.search.similarity_threshold - 0.7).abs() < 1e-9);
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = Config::for_root(Path::new("/tmp/x"));
        config.queue.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_ratio_rejected() {
        let mut config = Config::for_root(Path::new("/tmp/x"));
        config.clustering.ratio = 0.0;
        assert!(config.validate().is_err());
        config.clustering.ratio = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn artifact_dir_keeps_the_whole_reference() {
        let storage = StorageConfig {
            root: PathBuf::from("/data/files"),
        };
        assert_eq!(
            storage.artifact_dir("report.pdf").unwrap(),
            PathBuf::from("/data/files/report.pdf.d")
        );
        assert_eq!(
            storage.artifact_dir("2024/q1.pdf").unwrap(),
            PathBuf::from("/data/files/2024/q1.pdf.d")
        );
        assert_eq!(
            storage.source_path("report.pdf").unwrap(),
            PathBuf::from("/data/files/report.pdf")
        );
    }

    #[test]
    fn artifact_dirs_never_collide_with_each_other_or_sources() {
        let storage = StorageConfig {
            root: PathBuf::from("/data/files"),
        };
        let lower = storage.artifact_dir("a.pdf").unwrap();
        let upper = storage.artifact_dir("a.PDF").unwrap();
        assert_ne!(lower, upper);

        // A reference without an extension must not own its own source file.
        let scan_dir = storage.artifact_dir("scan").unwrap();
        assert_ne!(scan_dir, storage.source_path("scan").unwrap());
        assert_ne!(storage.artifact_dir("a").unwrap(), lower);
    }

    #[test]
    fn escaping_references_are_rejected() {
        let storage = StorageConfig {
            root: PathBuf::from("/data/files"),
        };
        for bad in [
            "",
            "/etc/passwd",
            "../outside.pdf",
            "sub/../../outside.pdf",
            "./report.pdf",
            "sub/..",
        ] {
            assert!(
                matches!(storage.artifact_dir(bad), Err(IndexingError::InvalidRef(_))),
                "artifact_dir accepted {:?}",
                bad
            );
            assert!(
                matches!(storage.source_path(bad), Err(IndexingError::InvalidRef(_))),
                "source_path accepted {:?}",
                bad
            );
        }
        assert!(StorageConfig::check_ref("2024/q1.pdf").is_ok());
        assert!(StorageConfig::check_ref("notes..v2.pdf").is_ok());
    }
}
