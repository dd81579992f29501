//! Core error types

use thiserror::Error;
use vellum_isolation::UnavailableReason;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Persistence unavailable: {0}")]
    IsolationUnavailable(UnavailableReason),

    #[error("Storage error: {0}")]
    Storage(#[from] vellum_storage::StorageError),

    #[error("Driver error: {0}")]
    Driver(#[from] vellum_driver::DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid origin: {0}")]
    InvalidOrigin(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}
