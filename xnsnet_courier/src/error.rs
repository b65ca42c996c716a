use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Clone, PartialEq, Eq)]
pub enum CourierError {
    #[error("Unexpected end of stream: {0}")]
    EndOfStream(String),
    #[error("Unknown CHOICE tag: {0}")]
    UnknownChoiceTag(String),
    #[error("Unknown ENUM value: {0}")]
    UnknownEnumValue(String),
    #[error("SEQUENCE too long: {0}")]
    SequenceTooLong(String),
    #[error("ARRAY length mismatch: {0}")]
    ArrayLengthMismatch(String),
    #[error("JSON error: {0}")]
    Json(String),
    #[error("Encode error: {0}")]
    EncodeError(String),
    #[error("Malformed message: {0}")]
    MessageError(String),
}

impl Debug for CourierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}", self)
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value.to_string())
    }
}
