//! Vellum Bridge Protocol
//!
//! Typed envelopes exchanged between the main context and the storage
//! worker. Every request carries a correlation id; every response carries
//! the same id and exactly one of a result or an error. Responses are
//! matched by id, never by arrival order.

mod error;
mod message;
mod port;
mod value;

pub use error::{BridgeError, DecodeFailure, ProtocolError};
pub use message::{
    Action, ActionResult, CorrelationId, ErrorKind, ErrorPayload, IdGenerator, Inbound, Outbound,
    Payload,
};
pub use port::{MessagePort, PortReceiver, PortSender};
pub use value::{Row, SqlValue};

pub type Result<T> = std::result::Result<T, BridgeError>;
