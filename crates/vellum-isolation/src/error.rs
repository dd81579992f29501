//! Isolation error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IsolationError {
    #[error("Interceptor registration failed: {0}")]
    Registration(String),

    #[error("Invalid interceptor scope: {0}")]
    InvalidScope(#[from] url::ParseError),
}
