use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has an invalid value: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("conflicting {group} options: `{kept}` and `{dropped}` were both given")]
    ConflictingOptions {
        group: &'static str,
        kept: &'static str,
        dropped: &'static str,
    },
}
