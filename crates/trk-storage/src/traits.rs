use trk_core::{Session, SessionId, SnapshotCreationRequest, SnapshotId, SnapshotRecord, TaskId, TaskRecord};

/// Collaborator behind the `snapshot` commands.
pub trait SnapshotController: Send + Sync {
    fn current_session(&self) -> anyhow::Result<Session>;
    fn session_by_name(&self, name: &str) -> anyhow::Result<Option<Session>>;
    /// Makes the session called `name` current, creating it first if no
    /// session has that name.
    fn start_session(&self, name: &str) -> anyhow::Result<Session>;
    /// Oldest first.
    fn sessions(&self) -> anyhow::Result<Vec<Session>>;

    /// Keys missing from `request` mean "use the system default".
    fn create(&self, request: &SnapshotCreationRequest) -> anyhow::Result<SnapshotRecord>;
    /// Returns false when no snapshot with `id` exists.
    fn delete(&self, id: &SnapshotId) -> anyhow::Result<bool>;
    /// Oldest first.
    fn list(&self, session_id: &SessionId, include_hidden: bool) -> anyhow::Result<Vec<SnapshotRecord>>;

    fn checkout(&self, id: &SnapshotId) -> anyhow::Result<bool>;
    fn checked_out(&self) -> anyhow::Result<Option<SnapshotId>>;
}

pub trait TaskStore: Send + Sync {
    fn insert_task(&self, task: &TaskRecord) -> anyhow::Result<()>;
    fn get_task(&self, id: &TaskId) -> anyhow::Result<Option<TaskRecord>>;
    /// Returns false when the task does not exist.
    fn update_task(&self, task: &TaskRecord) -> anyhow::Result<bool>;
}
