//! Vellum Storage Worker
//!
//! SQLite persistence behind a message port. The worker thread is the only
//! owner of the database handle: it is opened on the first message, never
//! leaves the thread, and is closed when the worker stops.

mod config;
mod database;
mod error;
mod transaction;
mod worker;

pub use config::{origin_root, Backend, StoreConfig, DEFAULT_STORE_NAME};
pub use error::StorageError;
pub use transaction::TxState;
pub use worker::{StorageWorker, WorkerHandle};

pub type Result<T> = std::result::Result<T, StorageError>;
