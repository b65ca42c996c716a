use std::fmt::Debug;
use thiserror::Error;
use xnsnet_core::error::CoreError;
use xnsnet_courier::error::CourierError;

#[derive(Error, Clone)]
pub enum ServerError {
    #[error("CoreError -> {0}")]
    CoreError(CoreError),
    #[error("CourierError -> {0}")]
    CourierError(CourierError),
    #[error("tokio oneshot channel error: {0}")]
    TokioOneshotChannelError(String),
    #[error("tokio mpsc channel error: {0}")]
    TokioMpscChannelError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Socket {0} is already bound")]
    SocketInUse(u16),
    #[error("Time error: {0}")]
    TimeError(String),
}

impl Debug for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}", self)
    }
}

impl From<CoreError> for ServerError {
    fn from(value: CoreError) -> Self {
        Self::CoreError(value)
    }
}

impl From<CourierError> for ServerError {
    fn from(value: CourierError) -> Self {
        Self::CourierError(value)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ServerError {
    fn from(value: tokio::sync::oneshot::error::RecvError) -> Self {
        ServerError::TokioOneshotChannelError(value.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ServerError {
    fn from(value: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ServerError::TokioMpscChannelError(value.to_string())
    }
}

impl From<time::error::ComponentRange> for ServerError {
    fn from(value: time::error::ComponentRange) -> Self {
        Self::TimeError(value.to_string())
    }
}
