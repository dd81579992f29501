//! Bridge error types

use thiserror::Error;

use crate::message::CorrelationId;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Message port closed")]
    PortClosed,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A message that does not follow the wire format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message is not an object")]
    NotAnObject,

    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Decoding failed; `id` is set when the message could still be correlated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct DecodeFailure {
    pub id: Option<CorrelationId>,
    pub error: ProtocolError,
}

impl DecodeFailure {
    pub(crate) fn new(id: Option<CorrelationId>, error: ProtocolError) -> Self {
        Self { id, error }
    }
}
