use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PROJECT_DIR: &str = ".trk";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_session")]
    pub default_session: String,
    /// strftime pattern for the `created at` column of `snapshot ls`.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_session() -> String {
    "default".to_string()
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_session: default_session(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl Config {
    pub fn default_for_project(name: &str) -> Self {
        Self {
            project: ProjectConfig {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
            },
            snapshots: SnapshotConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn project_dir(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR)
    }

    pub fn config_path(root: &Path) -> PathBuf {
        Self::project_dir(root).join("trk.toml")
    }

    pub fn db_path(root: &Path) -> PathBuf {
        Self::project_dir(root).join("trk.db")
    }
}
