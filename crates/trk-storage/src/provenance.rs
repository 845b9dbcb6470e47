//! Turns a resolved creation request into a snapshot record.
//!
//! Environment definitions and file collections are content-addressed: the
//! id is the SHA-256 of the files involved, so identical inputs always map
//! to the same id.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use trk_core::{
    CodeSource, EnvironmentSource, FileSource, SessionId, SnapshotCreationRequest, SnapshotData, SnapshotId,
    SnapshotRecord, TaskRecord,
};
use walkdir::WalkDir;

/// What the controller knows that the request does not.
pub struct CreateContext<'a> {
    pub project_root: &'a Path,
    pub current_session: &'a SessionId,
    /// The task named by the request's `task_id`, already looked up.
    pub task: Option<&'a TaskRecord>,
}

/// Fails when an option has the wrong JSON type, when `task_id` was given
/// but the task is unknown to the caller, or when a referenced file cannot
/// be read.
pub fn snapshot_from_request(request: &SnapshotCreationRequest, ctx: &CreateContext<'_>) -> Result<SnapshotRecord> {
    let session_id = request
        .session_id()?
        .or_else(|| ctx.task.map(|t| t.session_id().clone()))
        .unwrap_or_else(|| ctx.current_session.clone());

    let code_id = request.code_source()?.map(|src| match src {
        CodeSource::CodeId(id) | CodeSource::CommitId(id) => id,
    });

    let environment_id = match request.environment_source()? {
        Some(EnvironmentSource::Id(id)) => Some(id),
        Some(EnvironmentSource::DefinitionFile(path)) => Some(hash_file(&path)?),
        None => None,
    };

    let file_source = request
        .file_source()?
        .or_else(|| ctx.task.and_then(|t| t.setup().task_dirpath.clone()).map(|dir| FileSource::Paths(vec![dir])));
    let file_collection_id = match file_source {
        Some(FileSource::CollectionId(id)) => Some(id),
        Some(FileSource::Paths(paths)) if !paths.is_empty() => Some(hash_paths(&paths)?),
        Some(FileSource::Paths(_)) | None => None,
    };

    let data = SnapshotData {
        session_id: Some(session_id),
        task_id: ctx.task.map(|t| t.id().clone()),
        code_id,
        environment_id,
        file_collection_id,
        config: load_config(request, ctx.project_root)?,
        stats: Map::new(),
        message: request.message()?.map(str::to_string),
        label: request.label()?.map(str::to_string),
        visible: request.visible()?.unwrap_or(true),
    };
    let snap = SnapshotRecord::with_data(SnapshotId::new(), data);

    debug!(
        snapshot_id = %snap.id(),
        code_id = ?snap.data().code_id,
        environment_id = ?snap.data().environment_id,
        file_collection_id = ?snap.data().file_collection_id,
        "resolved snapshot provenance"
    );
    Ok(snap)
}

/// `config_filepath` must exist; `config_filename` is looked up under the
/// project root and skipped when absent.
fn load_config(request: &SnapshotCreationRequest, project_root: &Path) -> Result<Map<String, Value>> {
    if let Some(path) = request.config_filepath()? {
        return read_json_object(&path);
    }
    if let Some(name) = request.config_filename()? {
        let path = project_root.join(name);
        if path.is_file() {
            return read_json_object(&path);
        }
        debug!(path = %path.display(), "config file not found; using empty config");
    }
    Ok(Map::new())
}

pub fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    match serde_json::from_str::<Value>(&s).with_context(|| format!("parse json {}", path.display()))? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("{} does not contain a JSON object", path.display())),
    }
}

pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Hash of every regular file under `paths` (directories are walked), keyed
/// by path so renames change the id. Each file contributes its path, a NUL,
/// its length as a little-endian `u64` and its contents.
pub fn hash_paths(paths: &[PathBuf]) -> Result<String> {
    let mut files = Vec::new();
    for root in paths {
        if !root.exists() {
            return Err(anyhow!("path does not exist: {}", root.display()));
        }
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.with_context(|| format!("walk {}", root.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();

    let mut hasher = Sha256::new();
    for file in &files {
        let contents = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
        hasher.update(file.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use trk_core::{ModelId, RecordError, SnapshotRequestBuilder, TaskId, TaskSetup};

    fn request(v: Value) -> SnapshotCreationRequest {
        SnapshotRequestBuilder::new().build(v.as_object().unwrap())
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let dir = tempdir().unwrap();
        let session = SessionId::from_str("se-1");
        let ctx = CreateContext { project_root: dir.path(), current_session: &session, task: None };
        let snap = snapshot_from_request(&request(json!({})), &ctx).unwrap();
        assert_eq!(snap.data().session_id, Some(session));
        assert!(snap.data().visible);
        assert!(snap.data().code_id.is_none());
        assert!(snap.data().config.is_empty());
        assert_eq!(snap.updated_at(), snap.created_at());
    }

    #[test]
    fn definition_file_is_content_addressed() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("Dockerfile");
        let b = dir.path().join("Dockerfile.copy");
        std::fs::write(&a, "FROM python:3.11\n").unwrap();
        std::fs::write(&b, "FROM python:3.11\n").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        assert_eq!(hash_file(&a).unwrap().len(), 64);
    }

    #[test]
    fn file_collection_hash_tracks_contents() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(data.join("nested")).unwrap();
        std::fs::write(data.join("a.csv"), "1,2\n").unwrap();
        std::fs::write(data.join("nested/b.csv"), "3,4\n").unwrap();

        let first = hash_paths(&[data.clone()]).unwrap();
        assert_eq!(first, hash_paths(&[data.clone()]).unwrap());

        std::fs::write(data.join("a.csv"), "1,2,3\n").unwrap();
        assert_ne!(first, hash_paths(&[data.clone()]).unwrap());

        assert!(hash_paths(&[dir.path().join("missing")]).is_err());
    }

    #[test]
    fn config_comes_from_filepath_or_filename() {
        let dir = tempdir().unwrap();
        let session = SessionId::from_str("se-1");
        let ctx = CreateContext { project_root: dir.path(), current_session: &session, task: None };
        std::fs::write(dir.path().join("config.json"), r#"{"lr": 0.1}"#).unwrap();

        let by_name = snapshot_from_request(&request(json!({"config_filename": "config.json"})), &ctx).unwrap();
        assert_eq!(by_name.data().config["lr"], json!(0.1));

        let missing = snapshot_from_request(&request(json!({"config_filename": "nope.json"})), &ctx).unwrap();
        assert!(missing.data().config.is_empty());

        let path = dir.path().join("config.json").to_string_lossy().into_owned();
        let by_path = snapshot_from_request(&request(json!({"config_filepath": path})), &ctx).unwrap();
        assert_eq!(by_path.data().config["lr"], json!(0.1));

        std::fs::write(dir.path().join("list.json"), "[1, 2]").unwrap();
        let path = dir.path().join("list.json").to_string_lossy().into_owned();
        assert!(snapshot_from_request(&request(json!({"config_filepath": path})), &ctx).is_err());
    }

    #[test]
    fn task_supplies_session_and_files() {
        let dir = tempdir().unwrap();
        let task_dir = dir.path().join("task");
        std::fs::create_dir_all(&task_dir).unwrap();
        std::fs::write(task_dir.join("out.txt"), "done").unwrap();

        let task = TaskRecord::with_setup(
            TaskId::from_str("t1"),
            ModelId::from_str("m1"),
            SessionId::from_str("se-task"),
            "python train.py",
            TaskSetup { task_dirpath: Some(task_dir.clone()), ..TaskSetup::default() },
        );

        let current = SessionId::from_str("se-current");
        let ctx = CreateContext { project_root: dir.path(), current_session: &current, task: Some(&task) };
        let snap = snapshot_from_request(&request(json!({"task_id": "t1"})), &ctx).unwrap();
        assert_eq!(snap.data().session_id, Some(SessionId::from_str("se-task")));
        assert_eq!(snap.data().task_id, Some(TaskId::from_str("t1")));
        assert_eq!(snap.data().file_collection_id, Some(hash_paths(&[task_dir]).unwrap()));
    }

    #[test]
    fn commit_id_becomes_code_id() {
        let dir = tempdir().unwrap();
        let session = SessionId::from_str("se-1");
        let ctx = CreateContext { project_root: dir.path(), current_session: &session, task: None };
        let snap = snapshot_from_request(&request(json!({"commit_id": "abc123"})), &ctx).unwrap();
        assert_eq!(snap.data().code_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn file_boundaries_are_part_of_the_hash() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        let a = data.join("a");
        let b = data.join("b");

        // One file whose contents spell out a second entry, then the two real entries.
        let mut forged = b"1".to_vec();
        forged.extend_from_slice(b.to_string_lossy().as_bytes());
        forged.push(0);
        forged.extend_from_slice(b"2");
        std::fs::write(&a, &forged).unwrap();
        let single = hash_paths(&[data.clone()]).unwrap();

        std::fs::write(&a, "1").unwrap();
        std::fs::write(&b, "2").unwrap();
        let split = hash_paths(&[data.clone()]).unwrap();

        assert_ne!(single, split);
    }

    #[test]
    fn wrong_typed_options_fail_resolution() {
        let dir = tempdir().unwrap();
        let session = SessionId::from_str("se-1");
        let ctx = CreateContext { project_root: dir.path(), current_session: &session, task: None };

        let err = snapshot_from_request(&request(json!({"code_id": 7})), &ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecordError>(),
            Some(RecordError::InvalidField { field: "code_id", .. })
        ));

        let err = snapshot_from_request(&request(json!({"label": ["a"]})), &ctx).unwrap_err();
        assert!(matches!(err.downcast_ref::<RecordError>(), Some(RecordError::InvalidField { field: "label", .. })));

        let err = snapshot_from_request(&request(json!({"visible": 1})), &ctx).unwrap_err();
        assert!(matches!(err.downcast_ref::<RecordError>(), Some(RecordError::InvalidField { field: "visible", .. })));
    }
}
