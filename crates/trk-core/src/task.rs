use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::RecordError;
use crate::fields;
use crate::ids::{ModelId, SessionId, SnapshotId, TaskId};

/// Post-execution state, filled in once the task's command has finished.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskOutcome {
    pub after_snapshot_id: Option<SnapshotId>,
    pub hardware_info: Option<Map<String, Value>>,
    pub container_id: Option<String>,
    pub logs: Option<String>,
    pub status: Option<String>,
}

/// How the task is to be run. Fixed once the record exists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskSetup {
    pub before_snapshot_id: Option<SnapshotId>,
    pub ports: Vec<String>,
    pub gpu: bool,
    pub interactive: bool,
    pub task_dirpath: Option<PathBuf>,
    pub log_filepath: Option<PathBuf>,
}

/// A recorded command execution.
///
/// The execution definition (`model_id`, `session_id`, `command`), the
/// [`TaskSetup`] and `created_at` are fixed at construction. Post-execution
/// state only changes through [`record_execution`](Self::record_execution),
/// which also moves `updated_at`.
#[derive(Clone, Debug)]
pub struct TaskRecord {
    id: TaskId,
    model_id: ModelId,
    session_id: SessionId,
    command: String,

    setup: TaskSetup,
    outcome: TaskOutcome,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub const FIELD_NAMES: [&'static str; 17] = [
        "id",
        "model_id",
        "session_id",
        "command",
        "before_snapshot_id",
        "ports",
        "gpu",
        "interactive",
        "task_dirpath",
        "log_filepath",
        "after_snapshot_id",
        "hardware_info",
        "container_id",
        "logs",
        "status",
        "created_at",
        "updated_at",
    ];

    pub fn new(id: TaskId, model_id: ModelId, session_id: SessionId, command: impl Into<String>) -> Self {
        Self::with_setup(id, model_id, session_id, command, TaskSetup::default())
    }

    pub fn with_setup(
        id: TaskId,
        model_id: ModelId,
        session_id: SessionId,
        command: impl Into<String>,
        setup: TaskSetup,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            model_id,
            session_id,
            command: command.into(),
            setup,
            outcome: TaskOutcome::default(),
            created_at,
            updated_at: created_at,
        }
    }

    pub fn from_mapping(map: &Map<String, Value>) -> Result<Self, RecordError> {
        let id = TaskId::from_str(fields::required_str(map, "id")?);
        let model_id = ModelId::from_str(fields::required_str(map, "model_id")?);
        let session_id = SessionId::from_str(fields::required_str(map, "session_id")?);
        let command = fields::required_str(map, "command")?;

        let created_at = fields::timestamp(map, "created_at")?.unwrap_or_else(Utc::now);
        let updated_at = fields::timestamp(map, "updated_at")?.unwrap_or(created_at);

        Ok(Self {
            id,
            model_id,
            session_id,
            command,
            setup: TaskSetup {
                before_snapshot_id: fields::optional_str(map, "before_snapshot_id")?.map(SnapshotId::from_str),
                ports: fields::string_list(map, "ports")?,
                gpu: fields::bool_or(map, "gpu", false)?,
                interactive: fields::bool_or(map, "interactive", false)?,
                task_dirpath: fields::optional_path(map, "task_dirpath")?,
                log_filepath: fields::optional_path(map, "log_filepath")?,
            },
            outcome: TaskOutcome {
                after_snapshot_id: fields::optional_str(map, "after_snapshot_id")?.map(SnapshotId::from_str),
                hardware_info: fields::optional_object(map, "hardware_info")?,
                container_id: fields::optional_str(map, "container_id")?,
                logs: fields::optional_str(map, "logs")?,
                status: fields::optional_str(map, "status")?,
            },
            created_at,
            updated_at,
        })
    }

    pub fn to_mapping(&self) -> Map<String, Value> {
        let p = &self.setup;
        let o = &self.outcome;
        let mut m = Map::new();
        m.insert("id".into(), Value::String(self.id.0.clone()));
        m.insert("model_id".into(), Value::String(self.model_id.0.clone()));
        m.insert("session_id".into(), Value::String(self.session_id.0.clone()));
        m.insert("command".into(), Value::String(self.command.clone()));
        m.insert("before_snapshot_id".into(), fields::str_value(p.before_snapshot_id.as_ref().map(|s| s.as_str())));
        m.insert("ports".into(), Value::Array(p.ports.iter().cloned().map(Value::String).collect()));
        m.insert("gpu".into(), Value::Bool(p.gpu));
        m.insert("interactive".into(), Value::Bool(p.interactive));
        m.insert("task_dirpath".into(), fields::path_value(p.task_dirpath.as_deref()));
        m.insert("log_filepath".into(), fields::path_value(p.log_filepath.as_deref()));
        m.insert("after_snapshot_id".into(), fields::str_value(o.after_snapshot_id.as_ref().map(|s| s.as_str())));
        m.insert("hardware_info".into(), o.hardware_info.clone().map(Value::Object).unwrap_or(Value::Null));
        m.insert("container_id".into(), fields::str_value(o.container_id.as_deref()));
        m.insert("logs".into(), fields::str_value(o.logs.as_deref()));
        m.insert("status".into(), fields::str_value(o.status.as_deref()));
        m.insert("created_at".into(), fields::time_value(&self.created_at));
        m.insert("updated_at".into(), fields::time_value(&self.updated_at));
        m
    }

    /// Identity comparison; `None` never matches.
    pub fn equals(&self, other: Option<&Self>) -> bool {
        other.map(|o| o.id == self.id).unwrap_or(false)
    }

    pub fn record_execution(&mut self, outcome: TaskOutcome) {
        self.outcome = outcome;
        self.updated_at = Utc::now().max(self.created_at);
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn setup(&self) -> &TaskSetup {
        &self.setup
    }

    pub fn outcome(&self) -> &TaskOutcome {
        &self.outcome
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl PartialEq for TaskRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskRecord {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Map<String, Value> {
        json!({"id": "s1", "model_id": "m1", "session_id": "se1", "command": "run"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn construct_applies_defaults() {
        let task = TaskRecord::from_mapping(&base()).unwrap();
        assert_eq!(task.updated_at(), task.created_at());
        assert_eq!(task.setup(), &TaskSetup::default());
        assert_eq!(task.outcome(), &TaskOutcome::default());
    }

    #[test]
    fn each_required_field_is_checked() {
        for name in ["id", "model_id", "session_id", "command"] {
            let mut fields = base();
            fields.remove(name);
            assert_eq!(TaskRecord::from_mapping(&fields).unwrap_err(), RecordError::MissingField(name));
        }
    }

    #[test]
    fn wrong_type_is_rejected() {
        let mut fields = base();
        fields.insert("gpu".into(), json!("yes"));
        assert!(matches!(
            TaskRecord::from_mapping(&fields),
            Err(RecordError::InvalidField { field: "gpu", .. })
        ));
    }

    #[test]
    fn equality_ignores_everything_but_id() {
        let a = TaskRecord::from_mapping(&base()).unwrap();
        let mut fields = base();
        fields.insert("command".into(), json!("train.py"));
        let b = TaskRecord::from_mapping(&fields).unwrap();
        assert_eq!(a, b);
        assert!(a.equals(Some(&b)));
        assert!(!a.equals(None));
    }

    #[test]
    fn port_defaults_are_not_shared() {
        let mut fields = base();
        fields.insert("ports".into(), json!(["8888:8888"]));
        let a = TaskRecord::from_mapping(&fields).unwrap();
        let b = TaskRecord::from_mapping(&base()).unwrap();
        assert_eq!(a.setup().ports, vec!["8888:8888".to_string()]);
        assert!(b.setup().ports.is_empty());
    }

    #[test]
    fn mapping_round_trips() {
        let mut fields = base();
        fields.insert("ports".into(), json!(["8888:8888"]));
        fields.insert("gpu".into(), json!(true));
        fields.insert("task_dirpath".into(), json!("/tmp/task"));
        let task = TaskRecord::from_mapping(&fields).unwrap();

        let mapping = task.to_mapping();
        let mut keys: Vec<_> = mapping.keys().map(String::as_str).collect();
        keys.sort_unstable();
        let mut expected = TaskRecord::FIELD_NAMES.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);

        let back = TaskRecord::from_mapping(&mapping).unwrap();
        assert_eq!(back, task);
        assert_eq!(back.to_mapping(), mapping);
    }

    #[test]
    fn record_execution_updates_post_execution_state() {
        let mut task = TaskRecord::new(
            TaskId::from_str("t1"),
            ModelId::from_str("m1"),
            SessionId::from_str("se1"),
            "python train.py",
        );
        let created = task.created_at();
        task.record_execution(TaskOutcome {
            after_snapshot_id: Some(SnapshotId::from_str("snap-2")),
            container_id: Some("c0ffee".into()),
            status: Some("SUCCESS".into()),
            ..TaskOutcome::default()
        });
        assert_eq!(task.outcome().status.as_deref(), Some("SUCCESS"));
        assert_eq!(task.created_at(), created);
        assert!(task.updated_at() >= created);
        assert_eq!(task.command(), "python train.py");
    }
}
