//! Resolution of raw `snapshot create` options into a creation request.
//!
//! Provenance for code, environment and files can each come from one of two
//! options. The builder keeps the first truthy option of each group in
//! priority order and drops the rest; optional scalars are copied only when
//! truthy. Keys that do not survive are left out of the request entirely so
//! the controller falls back to its own defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{RecordError, RequestError};
use crate::ids::{SessionId, TaskId};
use crate::value::{truthy, OptionMap};

/// A set of options of which at most one may determine the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExclusiveGroup {
    pub name: &'static str,
    /// Candidate option names, highest priority first.
    pub candidates: &'static [&'static str],
}

pub const CODE_GROUP: ExclusiveGroup = ExclusiveGroup {
    name: "code",
    candidates: &["code_id", "commit_id"],
};

pub const ENVIRONMENT_GROUP: ExclusiveGroup = ExclusiveGroup {
    name: "environment",
    candidates: &["environment_id", "environment_definition_filepath"],
};

pub const FILE_GROUP: ExclusiveGroup = ExclusiveGroup {
    name: "file",
    candidates: &["file_collection_id", "file_collection"],
};

pub const EXCLUSIVE_GROUPS: [ExclusiveGroup; 3] = [CODE_GROUP, ENVIRONMENT_GROUP, FILE_GROUP];

pub const OPTIONAL_FIELDS: [&str; 7] = [
    "config_filepath",
    "config_filename",
    "session_id",
    "task_id",
    "message",
    "label",
    "visible",
];

/// A truthy option that lost to a higher-priority option of the same group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedOption {
    pub group: &'static str,
    pub kept: &'static str,
    pub dropped: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeSource {
    CodeId(String),
    CommitId(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvironmentSource {
    Id(String),
    DefinitionFile(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    CollectionId(String),
    Paths(Vec<PathBuf>),
}

/// Canonical request handed to a snapshot controller. Only resolved keys are
/// present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotCreationRequest(OptionMap);

impl SnapshotCreationRequest {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &OptionMap {
        &self.0
    }

    pub fn into_map(self) -> OptionMap {
        self.0
    }

    /// A present key must hold a string; anything else is a caller error
    /// that the builder's truthiness filter lets through.
    fn str_field(&self, key: &'static str) -> Result<Option<&str>, RecordError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(wrong_type(key, "a string", other)),
        }
    }

    pub fn code_source(&self) -> Result<Option<CodeSource>, RecordError> {
        if let Some(id) = self.str_field("code_id")? {
            return Ok(Some(CodeSource::CodeId(id.to_string())));
        }
        Ok(self.str_field("commit_id")?.map(|c| CodeSource::CommitId(c.to_string())))
    }

    pub fn environment_source(&self) -> Result<Option<EnvironmentSource>, RecordError> {
        if let Some(id) = self.str_field("environment_id")? {
            return Ok(Some(EnvironmentSource::Id(id.to_string())));
        }
        Ok(self
            .str_field("environment_definition_filepath")?
            .map(|p| EnvironmentSource::DefinitionFile(PathBuf::from(p))))
    }

    pub fn file_source(&self) -> Result<Option<FileSource>, RecordError> {
        if let Some(id) = self.str_field("file_collection_id")? {
            return Ok(Some(FileSource::CollectionId(id.to_string())));
        }
        let expected = "a path or a list of paths";
        match self.0.get("file_collection") {
            None => Ok(None),
            Some(Value::String(p)) => Ok(Some(FileSource::Paths(vec![PathBuf::from(p)]))),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(PathBuf::from)
                        .ok_or_else(|| wrong_type("file_collection", expected, item))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|paths| Some(FileSource::Paths(paths))),
            Some(other) => Err(wrong_type("file_collection", expected, other)),
        }
    }

    pub fn config_filepath(&self) -> Result<Option<PathBuf>, RecordError> {
        Ok(self.str_field("config_filepath")?.map(PathBuf::from))
    }

    pub fn config_filename(&self) -> Result<Option<&str>, RecordError> {
        self.str_field("config_filename")
    }

    pub fn session_id(&self) -> Result<Option<SessionId>, RecordError> {
        Ok(self.str_field("session_id")?.map(SessionId::from_str))
    }

    pub fn task_id(&self) -> Result<Option<TaskId>, RecordError> {
        Ok(self.str_field("task_id")?.map(TaskId::from_str))
    }

    pub fn message(&self) -> Result<Option<&str>, RecordError> {
        self.str_field("message")
    }

    pub fn label(&self) -> Result<Option<&str>, RecordError> {
        self.str_field("label")
    }

    pub fn visible(&self) -> Result<Option<bool>, RecordError> {
        match self.0.get("visible") {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(wrong_type("visible", "a boolean", other)),
        }
    }
}

fn wrong_type(field: &'static str, expected: &str, got: &Value) -> RecordError {
    RecordError::InvalidField { field, reason: format!("expected {expected}, got {got}") }
}

/// Turns a raw option set into a [`SnapshotCreationRequest`].
#[derive(Clone, Debug)]
pub struct SnapshotRequestBuilder {
    groups: Vec<ExclusiveGroup>,
    optional_fields: Vec<&'static str>,
}

impl Default for SnapshotRequestBuilder {
    fn default() -> Self {
        Self {
            groups: EXCLUSIVE_GROUPS.to_vec(),
            optional_fields: OPTIONAL_FIELDS.to_vec(),
        }
    }
}

impl SnapshotRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// First truthy option of each group wins; conflicting lower-priority
    /// options are dropped without error.
    pub fn build(&self, options: &OptionMap) -> SnapshotCreationRequest {
        self.resolve(options).0
    }

    /// Same resolution as [`build`](Self::build), also returning every option
    /// that was dropped because a higher-priority one in its group was set.
    pub fn build_with_report(&self, options: &OptionMap) -> (SnapshotCreationRequest, Vec<DroppedOption>) {
        let (request, dropped) = self.resolve(options);
        for d in &dropped {
            debug!(group = d.group, kept = d.kept, dropped = d.dropped, "dropped conflicting snapshot option");
        }
        (request, dropped)
    }

    /// Rejects option sets that supply more than one option of a group.
    pub fn build_strict(&self, options: &OptionMap) -> Result<SnapshotCreationRequest, RequestError> {
        let (request, dropped) = self.resolve(options);
        match dropped.into_iter().next() {
            Some(d) => Err(RequestError::ConflictingOptions {
                group: d.group,
                kept: d.kept,
                dropped: d.dropped,
            }),
            None => Ok(request),
        }
    }

    fn resolve(&self, options: &OptionMap) -> (SnapshotCreationRequest, Vec<DroppedOption>) {
        let mut resolved = OptionMap::new();
        let mut dropped = Vec::new();

        for group in &self.groups {
            let mut kept: Option<&'static str> = None;
            for &candidate in group.candidates {
                let Some(value) = truthy(options, candidate) else {
                    continue;
                };
                match kept {
                    None => {
                        resolved.insert(candidate.to_string(), value.clone());
                        kept = Some(candidate);
                    }
                    Some(winner) => dropped.push(DroppedOption {
                        group: group.name,
                        kept: winner,
                        dropped: candidate,
                    }),
                }
            }
        }

        for &field in &self.optional_fields {
            if let Some(value) = truthy(options, field) {
                resolved.insert(field.to_string(), value.clone());
            }
        }

        (SnapshotCreationRequest(resolved), dropped)
    }
}
