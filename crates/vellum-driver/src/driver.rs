//! Driver facade
//!
//! The pending-call table and the driver state sit behind one lock, so a
//! call can never be registered after the worker has been declared lost and
//! be left waiting forever.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use vellum_bridge::{
    Action, ActionResult, CorrelationId, IdGenerator, Inbound, MessagePort, Outbound, Payload,
    PortReceiver, PortSender, Row, SqlValue,
};

use crate::error::DriverError;
use crate::state::DriverState;
use crate::Result;

type Reply = std::result::Result<Outbound, DriverError>;

/// What the worker reported in its handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub worker: Uuid,
    pub store: String,
    pub opened_at: DateTime<Utc>,
}

struct Inner {
    state: DriverState,
    pending: HashMap<CorrelationId, oneshot::Sender<Reply>>,
    info: Option<WorkerInfo>,
}

impl Inner {
    /// Move to `WorkerLost` and hand back every call still waiting
    fn lose_worker(&mut self) -> Vec<oneshot::Sender<Reply>> {
        if self.state.can_transition_to(DriverState::WorkerLost) {
            self.state = DriverState::WorkerLost;
        }
        self.pending.drain().map(|(_, tx)| tx).collect()
    }
}

pub struct Driver {
    inner: Arc<Mutex<Inner>>,
    ids: IdGenerator,
    sender: PortSender,
}

impl Driver {
    /// Attach to the main-context end of a worker's port.
    ///
    /// Must be called within a tokio runtime: the response router runs as a
    /// background task.
    pub fn new(port: MessagePort) -> Self {
        let (sender, receiver) = port.split();
        let inner = Arc::new(Mutex::new(Inner {
            state: DriverState::Uninitialized,
            pending: HashMap::new(),
            info: None,
        }));

        tokio::spawn(route_responses(Arc::clone(&inner), receiver));

        Self {
            inner,
            ids: IdGenerator::new(),
            sender,
        }
    }

    pub fn state(&self) -> DriverState {
        self.inner.lock().state
    }

    pub fn pending_calls(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn worker_info(&self) -> Option<WorkerInfo> {
        self.inner.lock().info.clone()
    }

    /// Wait for the worker to open the store. Idempotent once ready.
    pub async fn handshake(&self, timeout: Duration) -> Result<WorkerInfo> {
        if let Some(info) = self.worker_info() {
            return Ok(info);
        }

        let (id, rx) = self.register(false)?;
        self.post(Inbound::Handshake { id })?;

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(reply) => reply.map_err(|_| DriverError::WorkerLost)??,
            Err(_) => {
                self.inner.lock().pending.remove(&id);
                tracing::warn!(correlation_id = %id, "Storage worker handshake timed out");
                return Err(DriverError::HandshakeTimeout(timeout));
            }
        };

        match reply {
            Outbound::Ready {
                worker,
                store,
                opened_at,
                ..
            } => {
                let info = WorkerInfo {
                    worker,
                    store,
                    opened_at,
                };

                let mut inner = self.inner.lock();
                if !inner.state.can_transition_to(DriverState::WorkerReady) {
                    return Err(DriverError::WorkerLost);
                }
                inner.state = DriverState::WorkerReady;
                inner.info = Some(info.clone());

                tracing::info!(worker_id = %info.worker, store = %info.store, "Storage worker ready");
                Ok(info)
            }
            Outbound::Failed { message, .. } => Err(DriverError::OpenFailed(message)),
            Outbound::Response { .. } => Err(DriverError::Protocol(
                "handshake answered with an action response".to_string(),
            )),
        }
    }

    /// Run one statement; rows come back in statement order
    pub async fn exec<I>(&self, sql: &str, params: I) -> Result<ActionResult>
    where
        I: IntoIterator<Item = SqlValue>,
    {
        self.call(Action::Exec {
            sql: sql.to_string(),
            params: params.into_iter().collect(),
        })
        .await
    }

    pub async fn query<I>(&self, sql: &str, params: I) -> Result<Vec<Row>>
    where
        I: IntoIterator<Item = SqlValue>,
    {
        Ok(self.exec(sql, params).await?.rows)
    }

    pub async fn begin_transaction(&self) -> Result<()> {
        self.call(Action::BeginTransaction).await.map(|_| ())
    }

    pub async fn end_transaction(&self) -> Result<()> {
        self.call(Action::EndTransaction).await.map(|_| ())
    }

    pub async fn rollback_transaction(&self) -> Result<()> {
        self.call(Action::RollbackTransaction).await.map(|_| ())
    }

    async fn call(&self, action: Action) -> Result<ActionResult> {
        let (id, rx) = self.register(true)?;
        tracing::debug!(correlation_id = %id, action = action.name(), "Dispatching call");
        self.post(Inbound::Request { id, action })?;

        let reply = rx.await.map_err(|_| DriverError::WorkerLost)??;
        match reply {
            Outbound::Response {
                payload: Payload::Result(result),
                ..
            } => Ok(result),
            Outbound::Response {
                payload: Payload::Error(error),
                ..
            } => Err(error.into()),
            other => Err(DriverError::Protocol(format!(
                "unexpected reply to call {}: {:?}",
                id, other
            ))),
        }
    }

    /// Record a pending entry under a fresh id
    fn register(&self, require_ready: bool) -> Result<(CorrelationId, oneshot::Receiver<Reply>)> {
        let mut inner = self.inner.lock();
        match inner.state {
            DriverState::WorkerLost => return Err(DriverError::WorkerLost),
            DriverState::Uninitialized if require_ready => return Err(DriverError::NotReady),
            _ => {}
        }

        let id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(id, tx);
        Ok((id, rx))
    }

    fn post(&self, message: Inbound) -> Result<()> {
        let value = match message.to_value() {
            Ok(value) => value,
            Err(e) => {
                self.inner.lock().pending.remove(&message.id());
                return Err(DriverError::Protocol(e.to_string()));
            }
        };
        if self.sender.post(value).is_ok() {
            return Ok(());
        }

        let waiting = self.inner.lock().lose_worker();
        for tx in waiting {
            let _ = tx.send(Err(DriverError::WorkerLost));
        }
        Err(DriverError::WorkerLost)
    }
}

async fn route_responses(inner: Arc<Mutex<Inner>>, mut receiver: PortReceiver) {
    while let Some(value) = receiver.recv().await {
        let raw_id = value.get("id").and_then(Value::as_u64).map(CorrelationId::new);

        let reply = match Outbound::decode(value) {
            Ok(message) => Some((message.id(), Ok(message))),
            Err(e) => {
                tracing::warn!(correlation_id = ?raw_id, "Malformed worker message: {}", e);
                raw_id.map(|id| (id, Err(DriverError::Protocol(e.to_string()))))
            }
        };
        let Some((id, reply)) = reply else { continue };

        // Removing the entry is what guarantees a single delivery per id
        let waiter = inner.lock().pending.remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => {
                tracing::warn!(correlation_id = %id, "Discarding reply for unknown call");
            }
        }
    }

    let waiting = inner.lock().lose_worker();
    tracing::warn!(rejected = waiting.len(), "Storage worker lost");
    for tx in waiting {
        let _ = tx.send(Err(DriverError::WorkerLost));
    }
}
