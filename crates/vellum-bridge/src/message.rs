//! Request and response envelopes
//!
//! Main context → worker:
//! ```text
//! {"type":"handshake","id":1}
//! {"type":"request","id":2,"action":"exec","sql":"SELECT ?1","params":[1]}
//! {"type":"request","id":3,"action":"begin_transaction"}
//! ```
//! Worker → main context:
//! ```text
//! {"type":"ready","id":1,"worker":"…","store":"…","opened_at":"…"}
//! {"type":"failed","id":1,"message":"…"}
//! {"type":"response","id":2,"result":{"rows":[[["title","a"],["n",1]]],"changes":0,"last_insert_rowid":0}}
//! {"type":"response","id":3,"error":{"kind":"transaction_state","message":"…"}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::{DecodeFailure, ProtocolError};
use crate::value::{Row, SqlValue};

/// Opaque token pairing a request with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues correlation ids that never repeat for the generator's lifetime
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// The four actions the storage worker understands
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Exec { sql: String, params: Vec<SqlValue> },
    BeginTransaction,
    EndTransaction,
    RollbackTransaction,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Exec { .. } => "exec",
            Action::BeginTransaction => "begin_transaction",
            Action::EndTransaction => "end_transaction",
            Action::RollbackTransaction => "rollback_transaction",
        }
    }
}

/// Messages posted to the worker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Handshake {
        id: CorrelationId,
    },
    Request {
        id: CorrelationId,
        #[serde(flatten)]
        action: Action,
    },
}

impl Inbound {
    pub fn id(&self) -> CorrelationId {
        match self {
            Inbound::Handshake { id } | Inbound::Request { id, .. } => *id,
        }
    }

    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a message received by the worker.
    ///
    /// Failures keep the correlation id whenever one could be read so the
    /// sender can be answered with a protocol error.
    pub fn decode(value: &Value) -> Result<Inbound, DecodeFailure> {
        let obj = value
            .as_object()
            .ok_or_else(|| DecodeFailure::new(None, ProtocolError::NotAnObject))?;

        let id = obj
            .get("id")
            .and_then(Value::as_u64)
            .map(CorrelationId)
            .ok_or_else(|| DecodeFailure::new(None, ProtocolError::MissingField("id")))?;

        let fail = |error| DecodeFailure::new(Some(id), error);

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| fail(ProtocolError::MissingField("type")))?;

        match kind {
            "handshake" => Ok(Inbound::Handshake { id }),
            "request" => {
                let action = decode_action(obj).map_err(fail)?;
                Ok(Inbound::Request { id, action })
            }
            other => Err(fail(ProtocolError::UnknownMessageType(other.to_string()))),
        }
    }
}

fn decode_action(obj: &Map<String, Value>) -> Result<Action, ProtocolError> {
    let name = obj
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("action"))?;

    match name {
        "exec" => {
            let sql = obj
                .get("sql")
                .and_then(Value::as_str)
                .ok_or(ProtocolError::MissingField("sql"))?
                .to_string();
            let params = match obj.get("params") {
                None | Some(Value::Null) => Vec::new(),
                Some(v) => Vec::<SqlValue>::deserialize(v)
                    .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?,
            };
            Ok(Action::Exec { sql, params })
        }
        "begin_transaction" => Ok(Action::BeginTransaction),
        "end_transaction" => Ok(Action::EndTransaction),
        "rollback_transaction" => Ok(Action::RollbackTransaction),
        other => Err(ProtocolError::UnsupportedAction(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Rows inserted, updated or deleted by this statement
    #[serde(default)]
    pub changes: u64,
    /// Rowid of the most recent successful insert on the connection. A
    /// statement that inserts nothing leaves it at the previous value.
    #[serde(default)]
    pub last_insert_rowid: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or unsupported message
    Protocol,
    /// The store rejected the statement
    Statement,
    /// begin/commit/rollback out of sequence
    TransactionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

/// Exactly one of a result or an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Result(ActionResult),
    Error(ErrorPayload),
}

/// Messages posted by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Ready {
        id: CorrelationId,
        worker: Uuid,
        store: String,
        opened_at: DateTime<Utc>,
    },
    Failed {
        id: CorrelationId,
        message: String,
    },
    Response {
        id: CorrelationId,
        #[serde(flatten)]
        payload: Payload,
    },
}

impl Outbound {
    pub fn ok(id: CorrelationId, result: ActionResult) -> Self {
        Outbound::Response {
            id,
            payload: Payload::Result(result),
        }
    }

    pub fn error(id: CorrelationId, kind: ErrorKind, message: impl Into<String>) -> Self {
        Outbound::Response {
            id,
            payload: Payload::Error(ErrorPayload {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn id(&self) -> CorrelationId {
        match self {
            Outbound::Ready { id, .. } | Outbound::Failed { id, .. } | Outbound::Response { id, .. } => {
                *id
            }
        }
    }

    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn decode(value: Value) -> Result<Outbound, ProtocolError> {
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }
}
