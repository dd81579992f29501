//! Driver State Machine
//!
//! ```text
//! Uninitialized
//!   ↓ handshake answered
//! WorkerReady
//!   ↓ worker terminated
//! WorkerLost
//! ```
//! `WorkerLost` is final for a driver; a new worker needs a new driver.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Uninitialized,
    WorkerReady,
    WorkerLost,
}

impl DriverState {
    pub fn can_transition_to(&self, target: DriverState) -> bool {
        matches!(
            (self, target),
            (DriverState::Uninitialized, DriverState::WorkerReady)
                | (DriverState::Uninitialized, DriverState::WorkerLost)
                | (DriverState::WorkerReady, DriverState::WorkerLost)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Uninitialized => "uninitialized",
            DriverState::WorkerReady => "worker_ready",
            DriverState::WorkerLost => "worker_lost",
        }
    }
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
