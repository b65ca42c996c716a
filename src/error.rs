use std::fmt::Debug;
use thiserror::Error;
use xnsnet_server::error::ServerError;

#[derive(Error, Clone)]
pub enum AppError {
    #[error("ServerError -> {0}")]
    ServerError(ServerError),
    #[error("tokio error: {0}")]
    TokioError(String),
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("environment error: {0}")]
    EnvError(String),
}

impl Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}", self)
    }
}

impl From<ServerError> for AppError {
    fn from(value: ServerError) -> Self {
        Self::ServerError(value)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::TokioError(value.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<dotenvy::Error> for AppError {
    fn from(e: dotenvy::Error) -> Self {
        Self::EnvError(e.to_string())
    }
}
