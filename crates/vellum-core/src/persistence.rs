//! Boot sequence and the running storage stack
//!
//! ```text
//! page load → negotiate isolation ─ reload scheduled ──→ Boot::Reloading
//!                │
//!                ├─ isolated ──────→ persistent worker + driver
//!                └─ unavailable ───→ FallbackPolicy::InMemory → ephemeral worker + driver
//!                                    FallbackPolicy::Fail     → CoreError::IsolationUnavailable
//! ```

use std::time::Duration;

use vellum_bridge::MessagePort;
use vellum_driver::{Driver, DriverState, WorkerInfo};
use vellum_isolation::{IsolationState, Negotiation, Negotiator, PageContext, UnavailableReason};
use vellum_storage::{StorageError, StorageWorker, StoreConfig, WorkerHandle};

use crate::config::{Config, FallbackPolicy};
use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// Committed data is durable in origin-private storage
    Persistent,
    /// Persistence unavailable; data lives only as long as the worker
    Ephemeral { reason: UnavailableReason },
}

impl StorageMode {
    pub fn is_persistent(&self) -> bool {
        matches!(self, StorageMode::Persistent)
    }
}

pub enum Boot {
    Ready(Persistence),
    /// The page is about to reload under the isolation interceptor
    Reloading,
}

/// Run the page-load sequence against `page`
pub async fn boot(config: &Config, page: &dyn PageContext) -> Result<Boot> {
    let negotiator = Negotiator::new(config.host_support, config.embedder_policy);

    let (store, mode) = match negotiator.negotiate(page) {
        Negotiation::ReloadScheduled => return Ok(Boot::Reloading),
        Negotiation::AlreadyIsolated => (config.persistent_store()?, StorageMode::Persistent),
        Negotiation::Unavailable(reason) => match config.fallback {
            FallbackPolicy::Fail => return Err(CoreError::IsolationUnavailable(reason)),
            FallbackPolicy::InMemory => {
                tracing::warn!(%reason, "Persistence unavailable, using in-memory store");
                (config.memory_store(), StorageMode::Ephemeral { reason })
            }
        },
    };

    let persistence =
        Persistence::start(store, mode, negotiator.state(), config.handshake_timeout()).await?;
    Ok(Boot::Ready(persistence))
}

/// A storage worker and the driver talking to it
pub struct Persistence {
    store: StoreConfig,
    mode: StorageMode,
    isolation: IsolationState,
    handshake_timeout: Duration,
    worker: WorkerHandle,
    driver: Driver,
}

impl Persistence {
    async fn start(
        store: StoreConfig,
        mode: StorageMode,
        isolation: IsolationState,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let (worker, driver) = connect(&store, handshake_timeout).await?;

        tracing::info!(
            store = %store.location(),
            persistent = mode.is_persistent(),
            "Persistence started"
        );

        Ok(Self {
            store,
            mode,
            isolation,
            handshake_timeout,
            worker,
            driver,
        })
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn mode(&self) -> &StorageMode {
        &self.mode
    }

    pub fn isolation(&self) -> IsolationState {
        self.isolation
    }

    pub fn worker_info(&self) -> Option<WorkerInfo> {
        self.driver.worker_info()
    }

    /// Simulate a crash of the storage worker; pending calls are rejected
    pub fn terminate_worker(&self) {
        self.worker.terminate();
    }

    /// Replace the worker with a fresh one on the same store.
    ///
    /// The old worker is terminated before the new one opens; if the new one
    /// fails its handshake the old driver keeps reporting `WorkerLost`.
    pub async fn restart(&mut self) -> Result<()> {
        self.worker.terminate();
        let (worker, driver) = connect(&self.store, self.handshake_timeout).await?;
        let old = std::mem::replace(&mut self.worker, worker);
        self.driver = driver;
        stop(old).await?;

        tracing::info!(store = %self.store.location(), "Storage worker restarted");
        Ok(())
    }

    pub async fn shutdown(self) -> Result<()> {
        let Persistence { worker, driver, .. } = self;
        drop(driver);
        stop(worker).await
    }
}

async fn connect(store: &StoreConfig, handshake_timeout: Duration) -> Result<(WorkerHandle, Driver)> {
    let (main, worker_port) = MessagePort::pair();
    let worker = StorageWorker::spawn(store.clone(), worker_port)?;
    let driver = Driver::new(main);

    if let Err(e) = driver.handshake(handshake_timeout).await {
        worker.terminate();
        return Err(e.into());
    }
    debug_assert_eq!(driver.state(), DriverState::WorkerReady);

    Ok((worker, driver))
}

async fn stop(worker: WorkerHandle) -> Result<()> {
    worker.terminate();
    tokio::task::spawn_blocking(move || worker.join())
        .await
        .map_err(|_| StorageError::WorkerPanicked)??;
    Ok(())
}
