//! Transaction State Machine
//!
//! ```text
//! Idle
//!   ↓ begin_transaction
//! InTransaction
//!   ↓ end_transaction | rollback_transaction
//! Idle
//! ```
//! Transactions do not nest.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    #[default]
    Idle,
    InTransaction,
}

impl TxState {
    pub fn can_transition_to(&self, target: TxState) -> bool {
        matches!(
            (self, target),
            (TxState::Idle, TxState::InTransaction) | (TxState::InTransaction, TxState::Idle)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Idle => "idle",
            TxState::InTransaction => "in_transaction",
        }
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
