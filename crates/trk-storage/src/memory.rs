use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use tracing::info;
use trk_core::{Session, SessionId, SnapshotCreationRequest, SnapshotId, SnapshotRecord, TaskId, TaskRecord};

use crate::provenance::{snapshot_from_request, CreateContext};
use crate::traits::{SnapshotController, TaskStore};

/// In-memory controller for tests. Not durable.
pub struct InMemoryController {
    project_root: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    sessions: Vec<Session>,
    current_session: SessionId,
    snapshots: HashMap<String, SnapshotRecord>,
    tasks: HashMap<String, TaskRecord>,
    checked_out: Option<SnapshotId>,
}

impl InMemoryController {
    /// Starts with a single `default` session.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let session = Session::new("default");
        Self {
            project_root: project_root.into(),
            inner: Mutex::new(Inner {
                current_session: session.id.clone(),
                sessions: vec![session],
                snapshots: HashMap::new(),
                tasks: HashMap::new(),
                checked_out: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory controller lock poisoned"))
    }
}

impl SnapshotController for InMemoryController {
    fn current_session(&self) -> Result<Session> {
        let inner = self.lock()?;
        inner
            .sessions
            .iter()
            .find(|s| s.id == inner.current_session)
            .cloned()
            .ok_or_else(|| anyhow!("current session {} is missing", inner.current_session))
    }

    fn session_by_name(&self, name: &str) -> Result<Option<Session>> {
        let inner = self.lock()?;
        Ok(inner.sessions.iter().find(|s| s.name == name).cloned())
    }

    fn start_session(&self, name: &str) -> Result<Session> {
        let mut inner = self.lock()?;
        let session = match inner.sessions.iter().find(|s| s.name == name) {
            Some(existing) => existing.clone(),
            None => {
                let session = Session::new(name);
                info!(session_id = %session.id, name, "session created");
                inner.sessions.push(session.clone());
                session
            }
        };
        inner.current_session = session.id.clone();
        Ok(session)
    }

    fn sessions(&self) -> Result<Vec<Session>> {
        Ok(self.lock()?.sessions.clone())
    }

    fn create(&self, request: &SnapshotCreationRequest) -> Result<SnapshotRecord> {
        let mut inner = self.lock()?;
        let task = match request.task_id()? {
            Some(id) => Some(
                inner
                    .tasks
                    .get(id.as_str())
                    .cloned()
                    .ok_or_else(|| anyhow!("task {} not found", id))?,
            ),
            None => None,
        };
        let ctx = CreateContext {
            project_root: &self.project_root,
            current_session: &inner.current_session,
            task: task.as_ref(),
        };
        let snap = snapshot_from_request(request, &ctx)?;
        info!(snapshot_id = %snap.id(), "snapshot created");
        inner.snapshots.insert(snap.id().0.clone(), snap.clone());
        Ok(snap)
    }

    fn delete(&self, id: &SnapshotId) -> Result<bool> {
        let mut inner = self.lock()?;
        let removed = inner.snapshots.remove(id.as_str()).is_some();
        if removed && inner.checked_out.as_ref() == Some(id) {
            inner.checked_out = None;
        }
        Ok(removed)
    }

    fn list(&self, session_id: &SessionId, include_hidden: bool) -> Result<Vec<SnapshotRecord>> {
        let inner = self.lock()?;
        let mut out: Vec<_> = inner
            .snapshots
            .values()
            .filter(|s| s.data().session_id.as_ref() == Some(session_id))
            .filter(|s| include_hidden || s.data().visible)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id())));
        Ok(out)
    }

    fn checkout(&self, id: &SnapshotId) -> Result<bool> {
        let mut inner = self.lock()?;
        if !inner.snapshots.contains_key(id.as_str()) {
            return Ok(false);
        }
        inner.checked_out = Some(id.clone());
        Ok(true)
    }

    fn checked_out(&self) -> Result<Option<SnapshotId>> {
        Ok(self.lock()?.checked_out.clone())
    }
}

impl TaskStore for InMemoryController {
    fn insert_task(&self, task: &TaskRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner.tasks.insert(task.id().0.clone(), task.clone());
        Ok(())
    }

    fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.lock()?.tasks.get(id.as_str()).cloned())
    }

    fn update_task(&self, task: &TaskRecord) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.tasks.get_mut(task.id().as_str()) {
            Some(existing) => {
                *existing = task.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
