use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("no trk project found at {}; run `trk init` first", root.display())]
    NotInitialized { root: PathBuf },
}
