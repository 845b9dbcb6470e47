use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::RecordError;
use crate::fields;
use crate::ids::{SessionId, SnapshotId, TaskId};

/// Everything a snapshot records apart from its id and timestamps.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotData {
    pub session_id: Option<SessionId>,
    pub task_id: Option<TaskId>,

    pub code_id: Option<String>,
    pub environment_id: Option<String>,
    pub file_collection_id: Option<String>,

    pub config: Map<String, Value>,
    pub stats: Map<String, Value>,

    pub message: Option<String>,
    pub label: Option<String>,
    pub visible: bool,
}

impl Default for SnapshotData {
    fn default() -> Self {
        Self {
            session_id: None,
            task_id: None,
            code_id: None,
            environment_id: None,
            file_collection_id: None,
            config: Map::new(),
            stats: Map::new(),
            message: None,
            label: None,
            visible: true,
        }
    }
}

/// A versioned capture of code, environment, files, config and stats.
///
/// The data block is read through [`data`](Self::data) and changed only
/// through [`update`](Self::update), which moves `updated_at`.
#[derive(Clone, Debug)]
pub struct SnapshotRecord {
    id: SnapshotId,
    data: SnapshotData,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub const FIELD_NAMES: [&'static str; 13] = [
        "id",
        "session_id",
        "task_id",
        "code_id",
        "environment_id",
        "file_collection_id",
        "config",
        "stats",
        "message",
        "label",
        "visible",
        "created_at",
        "updated_at",
    ];

    pub fn new(id: SnapshotId) -> Self {
        Self::with_data(id, SnapshotData::default())
    }

    pub fn with_data(id: SnapshotId, data: SnapshotData) -> Self {
        let created_at = Utc::now();
        Self { id, data, created_at, updated_at: created_at }
    }

    pub fn from_mapping(map: &Map<String, Value>) -> Result<Self, RecordError> {
        let id = SnapshotId::from_str(fields::required_str(map, "id")?);
        let created_at = fields::timestamp(map, "created_at")?.unwrap_or_else(Utc::now);
        let updated_at = fields::timestamp(map, "updated_at")?.unwrap_or(created_at);

        let data = SnapshotData {
            session_id: fields::optional_str(map, "session_id")?.map(SessionId::from_str),
            task_id: fields::optional_str(map, "task_id")?.map(TaskId::from_str),
            code_id: fields::optional_str(map, "code_id")?,
            environment_id: fields::optional_str(map, "environment_id")?,
            file_collection_id: fields::optional_str(map, "file_collection_id")?,
            config: fields::optional_object(map, "config")?.unwrap_or_default(),
            stats: fields::optional_object(map, "stats")?.unwrap_or_default(),
            message: fields::optional_str(map, "message")?,
            label: fields::optional_str(map, "label")?,
            visible: fields::bool_or(map, "visible", true)?,
        };
        Ok(Self { id, data, created_at, updated_at })
    }

    pub fn to_mapping(&self) -> Map<String, Value> {
        let d = &self.data;
        let mut m = Map::new();
        m.insert("id".into(), Value::String(self.id.0.clone()));
        m.insert("session_id".into(), fields::str_value(d.session_id.as_ref().map(|s| s.as_str())));
        m.insert("task_id".into(), fields::str_value(d.task_id.as_ref().map(|t| t.as_str())));
        m.insert("code_id".into(), fields::str_value(d.code_id.as_deref()));
        m.insert("environment_id".into(), fields::str_value(d.environment_id.as_deref()));
        m.insert("file_collection_id".into(), fields::str_value(d.file_collection_id.as_deref()));
        m.insert("config".into(), Value::Object(d.config.clone()));
        m.insert("stats".into(), Value::Object(d.stats.clone()));
        m.insert("message".into(), fields::str_value(d.message.as_deref()));
        m.insert("label".into(), fields::str_value(d.label.as_deref()));
        m.insert("visible".into(), Value::Bool(d.visible));
        m.insert("created_at".into(), fields::time_value(&self.created_at));
        m.insert("updated_at".into(), fields::time_value(&self.updated_at));
        m
    }

    pub fn equals(&self, other: Option<&Self>) -> bool {
        other.map(|o| o.id == self.id).unwrap_or(false)
    }

    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    pub fn data(&self) -> &SnapshotData {
        &self.data
    }

    /// Applies `change` to the data block and stamps `updated_at`.
    pub fn update(&mut self, change: impl FnOnce(&mut SnapshotData)) {
        change(&mut self.data);
        self.updated_at = Utc::now().max(self.created_at);
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl PartialEq for SnapshotRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SnapshotRecord {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_id_is_required() {
        let snap = SnapshotRecord::from_mapping(&json!({"id": "snap-1"}).as_object().cloned().unwrap()).unwrap();
        assert_eq!(snap.id().as_str(), "snap-1");
        assert!(snap.data().visible);
        assert!(snap.data().config.is_empty());
        assert!(snap.data().stats.is_empty());
        assert_eq!(snap.updated_at(), snap.created_at());

        assert_eq!(
            SnapshotRecord::from_mapping(&Map::new()).unwrap_err(),
            RecordError::MissingField("id")
        );
    }

    #[test]
    fn explicit_timestamps_are_kept() {
        let fields = json!({
            "id": "snap-1",
            "created_at": "2024-01-02T03:04:05Z",
            "updated_at": "2024-02-02T03:04:05Z",
        });
        let snap = SnapshotRecord::from_mapping(fields.as_object().unwrap()).unwrap();
        assert_eq!(snap.created_at().to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert!(snap.updated_at() > snap.created_at());
    }

    #[test]
    fn bad_timestamp_is_invalid() {
        let fields = json!({"id": "snap-1", "created_at": "yesterday"});
        assert!(matches!(
            SnapshotRecord::from_mapping(fields.as_object().unwrap()),
            Err(RecordError::InvalidField { field: "created_at", .. })
        ));
    }

    #[test]
    fn mapping_exposes_fixed_field_list() {
        let mut data = SnapshotData { label: Some("best".into()), ..SnapshotData::default() };
        data.config.insert("lr".into(), json!(0.01));
        let snap = SnapshotRecord::with_data(SnapshotId::from_str("snap-1"), data);

        let mapping = snap.to_mapping();
        assert_eq!(mapping.len(), SnapshotRecord::FIELD_NAMES.len());
        for name in SnapshotRecord::FIELD_NAMES {
            assert!(mapping.contains_key(name), "missing {name}");
        }
        assert_eq!(mapping["message"], Value::Null);

        let back = SnapshotRecord::from_mapping(&mapping).unwrap();
        assert_eq!(back, snap);
        assert_eq!(back.data(), snap.data());
        assert_eq!(back.data().config["lr"], json!(0.01));
        assert_eq!(back.created_at(), snap.created_at());
    }

    #[test]
    fn update_moves_updated_at() {
        let raw = json!({
            "id": "snap-1",
            "created_at": "2024-01-02T03:04:05Z",
            "label": "draft",
        });
        let mut snap = SnapshotRecord::from_mapping(raw.as_object().unwrap()).unwrap();
        assert_eq!(snap.updated_at(), snap.created_at());

        snap.update(|d| {
            d.label = Some("final".into());
            d.visible = false;
        });
        assert!(snap.updated_at() > snap.created_at());
        assert_eq!(snap.data().label.as_deref(), Some("final"));
        assert!(!snap.data().visible);
        assert_eq!(snap.to_mapping()["updated_at"], fields::time_value(&snap.updated_at()));
    }

    #[test]
    fn with_data_starts_unmodified() {
        let snap = SnapshotRecord::with_data(SnapshotId::new(), SnapshotData::default());
        assert_eq!(snap.updated_at(), snap.created_at());
        assert!(snap.data().visible);
    }
}
