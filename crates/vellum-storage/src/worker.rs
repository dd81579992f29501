//! Storage worker
//!
//! Runs on its own named thread with a single-threaded runtime. Messages
//! are handled strictly one at a time in arrival order. A terminate signal
//! wins over queued messages: whatever has not started yet is abandoned,
//! and a statement already running completes without its reply being sent.

use serde_json::Value;
use std::thread::{self, JoinHandle};
use tokio::sync::watch;
use uuid::Uuid;

use vellum_bridge::{Action, ActionResult, ErrorKind, Inbound, MessagePort, Outbound};

use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::StorageError;
use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerControl {
    Run,
    Terminate,
}

pub struct StorageWorker {
    id: Uuid,
    config: StoreConfig,
    db: Option<Database>,
}

impl StorageWorker {
    /// Start a worker serving `port`. The store is not opened until the
    /// first message arrives.
    pub fn spawn(config: StoreConfig, port: MessagePort) -> Result<WorkerHandle> {
        let id = Uuid::new_v4();
        let (control_tx, control_rx) = watch::channel(WorkerControl::Run);

        let worker = StorageWorker {
            id,
            config,
            db: None,
        };

        let thread = thread::Builder::new()
            .name(format!("vellum-storage-{}", &id.simple().to_string()[..8]))
            .spawn(move || worker.run(port, control_rx))?;

        tracing::info!(worker_id = %id, "Spawned storage worker");

        Ok(WorkerHandle {
            id,
            control: control_tx,
            thread: Some(thread),
        })
    }

    fn run(mut self, mut port: MessagePort, mut control: watch::Receiver<WorkerControl>) {
        let runtime = match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(worker_id = %self.id, "Failed to start worker runtime: {}", e);
                return;
            }
        };

        runtime.block_on(async {
            loop {
                tokio::select! {
                    biased;

                    changed = control.changed() => {
                        if changed.is_err() || *control.borrow() == WorkerControl::Terminate {
                            break;
                        }
                    }
                    message = port.recv() => {
                        let Some(message) = message else { break };
                        let reply = self.handle(&message);

                        // Terminated while the statement ran: the reply is abandoned
                        if *control.borrow() == WorkerControl::Terminate {
                            break;
                        }
                        if let Some(reply) = reply {
                            if let Err(e) = self.post(&port, reply) {
                                tracing::warn!(worker_id = %self.id, "Stopping, cannot reply: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        });

        let rolled_back = self
            .db
            .as_ref()
            .map(|db| db.tx_state() == crate::TxState::InTransaction)
            .unwrap_or(false);
        tracing::info!(
            worker_id = %self.id,
            open_transaction_discarded = rolled_back,
            "Storage worker stopped"
        );
    }

    fn handle(&mut self, message: &Value) -> Option<Outbound> {
        match Inbound::decode(message) {
            Err(failure) => match failure.id {
                Some(id) => {
                    tracing::warn!(worker_id = %self.id, correlation_id = %id, "Protocol error: {}", failure.error);
                    Some(Outbound::error(id, ErrorKind::Protocol, failure.error.to_string()))
                }
                None => {
                    tracing::warn!(worker_id = %self.id, "Dropping uncorrelated message: {}", failure.error);
                    None
                }
            },
            Ok(Inbound::Handshake { id }) => {
                let worker = self.id;
                let store = self.config.location();
                Some(match self.database() {
                    Ok(db) => Outbound::Ready {
                        id,
                        worker,
                        store,
                        opened_at: db.opened_at(),
                    },
                    Err(e) => {
                        tracing::error!(worker_id = %worker, "Failed to open store: {}", e);
                        Outbound::Failed {
                            id,
                            message: e.to_string(),
                        }
                    }
                })
            }
            Ok(Inbound::Request { id, action }) => {
                tracing::debug!(
                    worker_id = %self.id,
                    correlation_id = %id,
                    action = action.name(),
                    "Dispatching request"
                );
                Some(match self.dispatch(action) {
                    Ok(result) => Outbound::ok(id, result),
                    Err(e) => Outbound::error(id, e.kind(), e.to_string()),
                })
            }
        }
    }

    fn post(&self, port: &MessagePort, reply: Outbound) -> vellum_bridge::Result<()> {
        let value = match reply.to_value() {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(worker_id = %self.id, correlation_id = %reply.id(), "Failed to encode reply: {}", e);
                Outbound::error(reply.id(), ErrorKind::Protocol, format!("unencodable reply: {}", e))
                    .to_value()?
            }
        };
        port.post(value)
    }

    fn dispatch(&mut self, action: Action) -> Result<ActionResult> {
        let db = self.database()?;
        match action {
            Action::Exec { sql, params } => db.exec(&sql, &params),
            Action::BeginTransaction => db.begin().map(|_| ActionResult::default()),
            Action::EndTransaction => db.commit().map(|_| ActionResult::default()),
            Action::RollbackTransaction => db.rollback().map(|_| ActionResult::default()),
        }
    }

    /// Open the store on first use
    fn database(&mut self) -> Result<&mut Database> {
        let db = match self.db.take() {
            Some(db) => db,
            None => Database::open(&self.config)?,
        };
        Ok(self.db.insert(db))
    }
}

/// Main-context handle to a running storage worker
pub struct WorkerHandle {
    id: Uuid,
    control: watch::Sender<WorkerControl>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop the worker without draining its queue
    pub fn terminate(&self) {
        if self.control.send(WorkerControl::Terminate).is_ok() {
            tracing::info!(worker_id = %self.id, "Terminating storage worker");
        }
    }

    /// Wait for the worker thread to exit
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| StorageError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}
