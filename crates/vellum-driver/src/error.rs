//! Driver error types

use std::time::Duration;
use thiserror::Error;
use vellum_bridge::{ErrorKind, ErrorPayload};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Storage worker has not completed the handshake")]
    NotReady,

    #[error("Storage worker connection lost")]
    WorkerLost,

    #[error("Storage worker did not answer the handshake within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Storage worker could not open the store: {0}")]
    OpenFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Transaction state error: {0}")]
    TransactionState(String),
}

impl From<ErrorPayload> for DriverError {
    fn from(payload: ErrorPayload) -> Self {
        match payload.kind {
            ErrorKind::Protocol => DriverError::Protocol(payload.message),
            ErrorKind::Statement => DriverError::Statement(payload.message),
            ErrorKind::TransactionState => DriverError::TransactionState(payload.message),
        }
    }
}
