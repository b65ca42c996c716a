use std::fmt::Debug;
use std::net::AddrParseError;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Clone)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Hub connection error: {0}")]
    ConnectionError(String),
    #[error("Malformed frame: {0}")]
    FramingError(String),
    #[error("Address parse error: {0}")]
    ParseAddrError(String),
    #[error("Timeout error: {0}")]
    TimeoutError(String),
    #[error("tokio mpsc channel error: {0}")]
    TokioMpscChannelError(String),
    #[error("tokio oneshot channel error: {0}")]
    TokioOneshotChannelError(String),
}

impl Debug for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}", self)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value.to_string())
    }
}

impl From<AddrParseError> for CoreError {
    fn from(value: AddrParseError) -> Self {
        Self::ParseAddrError(value.to_string())
    }
}

impl From<ParseIntError> for CoreError {
    fn from(value: ParseIntError) -> Self {
        Self::ParseAddrError(value.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CoreError {
    fn from(value: tokio::time::error::Elapsed) -> Self {
        Self::TimeoutError(value.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for CoreError {
    fn from(value: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::TokioOneshotChannelError(value.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CoreError {
    fn from(value: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::TokioMpscChannelError(value.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for CoreError {
    fn from(value: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        Self::TokioMpscChannelError(value.to_string())
    }
}
