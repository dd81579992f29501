//! Vellum Driver
//!
//! Main-context side of the bridge. Each database call becomes exactly one
//! message to the storage worker; the calling task is suspended until the
//! response with the same correlation id comes back. Calls may be in flight
//! concurrently, but the store holds a single transaction context, so
//! callers must sequence begin/exec/commit themselves.

mod driver;
mod error;
mod state;

pub use driver::{Driver, WorkerInfo};
pub use error::DriverError;
pub use state::DriverState;

pub use vellum_bridge::{ActionResult, Row, SqlValue};

pub type Result<T> = std::result::Result<T, DriverError>;
