//! Storage error types

use thiserror::Error;
use vellum_bridge::ErrorKind;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transaction state error: {0}")]
    TransactionState(String),

    #[error("Storage worker panicked")]
    WorkerPanicked,
}

impl StorageError {
    /// How the failure is reported over the bridge
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::TransactionState(_) => ErrorKind::TransactionState,
            _ => ErrorKind::Statement,
        }
    }
}
