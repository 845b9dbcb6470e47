use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;
use trk_storage_sqlite::SqliteController;

use crate::{Config, ProjectError};

/// An initialized project directory and its snapshot controller.
pub struct Project {
    pub root: PathBuf,
    pub cfg: Config,
    pub controller: SqliteController,
}

impl Project {
    /// Fails with [`ProjectError::NotInitialized`] when `root` has no
    /// `.trk/trk.toml`; nothing is created in that case.
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&root);
        if !cfg_path.is_file() {
            return Err(ProjectError::NotInitialized { root }.into());
        }
        let cfg = Config::load_from(&cfg_path)?;
        let controller = SqliteController::open(&Config::db_path(&root), root.clone(), &cfg.snapshots.default_session)?;
        Ok(Self { root, cfg, controller })
    }

    /// Idempotent: an existing config is kept as is.
    pub fn init(root: &Path, name: Option<&str>) -> Result<Self> {
        let cfg_path = Config::config_path(root);
        if !cfg_path.exists() {
            let name = name
                .map(str::to_string)
                .or_else(|| root.file_name().and_then(|s| s.to_str()).map(str::to_string))
                .unwrap_or_else(|| "project".to_string());
            Config::default_for_project(&name).save_to(&cfg_path)?;
            info!(root = %root.display(), name = %name, "initialized project");
        }
        Self::open(root.to_path_buf())
    }
}
