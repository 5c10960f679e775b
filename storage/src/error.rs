use std::io;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage type '{0}' not supported")]
    UnsupportedType(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// 将IO错误按类型归类到存储错误
    pub fn from_io(context: impl AsRef<str>, err: io::Error) -> Self {
        let message = format!("{}: {}", context.as_ref(), err);
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFoundError(message),
            io::ErrorKind::PermissionDenied => StorageError::PermissionError(message),
            _ => StorageError::TransferError(message),
        }
    }

    /// Whether another attempt at the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::TransferError(_) | StorageError::ConnectionError(_)
        )
    }
}
