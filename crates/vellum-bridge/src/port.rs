//! Message ports
//!
//! A connected pair of endpoints, one for each side of the bridge. Values
//! posted on one end arrive on the other in posting order. Dropping an end
//! closes the channel; the peer sees `None` from `recv` once drained.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::BridgeError;
use crate::Result;

#[derive(Debug)]
pub struct MessagePort {
    sender: PortSender,
    receiver: PortReceiver,
}

impl MessagePort {
    /// Two entangled ports
    pub fn pair() -> (MessagePort, MessagePort) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let a = MessagePort {
            sender: PortSender { tx: a_tx },
            receiver: PortReceiver { rx: b_rx },
        };
        let b = MessagePort {
            sender: PortSender { tx: b_tx },
            receiver: PortReceiver { rx: a_rx },
        };
        (a, b)
    }

    pub fn post(&self, message: Value) -> Result<()> {
        self.sender.post(message)
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    pub fn split(self) -> (PortSender, PortReceiver) {
        (self.sender, self.receiver)
    }
}

#[derive(Debug, Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<Value>,
}

impl PortSender {
    pub fn post(&self, message: Value) -> Result<()> {
        self.tx.send(message).map_err(|_| BridgeError::PortClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct PortReceiver {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl PortReceiver {
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}
