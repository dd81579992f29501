//! Vellum Core
//!
//! Wires the pieces together in page-load order: negotiate isolation,
//! start the storage worker, attach the driver. When isolation cannot be
//! reached the configured fallback decides between an in-memory store and
//! failing outright.

mod config;
mod error;
mod persistence;

pub use config::{Config, FallbackPolicy};
pub use error::CoreError;
pub use persistence::{boot, Boot, Persistence, StorageMode};

// Re-export core components
pub use vellum_driver::{ActionResult, Driver, DriverError, DriverState, Row, SqlValue, WorkerInfo};
pub use vellum_isolation::{
    EmbedderPolicy, HeaderInterceptor, HostSupport, IsolationError, IsolationState, Negotiation,
    Negotiator, PageContext, UnavailableReason,
};
pub use vellum_storage::{StorageError, StoreConfig};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
