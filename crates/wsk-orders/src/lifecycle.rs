//! Delivery status state machine.
//!
//! ```text
//!   in_progress ──► ready ──(paid)──► delivered (term.)
//! ```
//!
//! The only input is the current status and the paid flag. The ledger is
//! never consulted here; payment reconciliation keeps the flag honest.

use std::fmt;

use wsk_schemas::OrderStatus;

use crate::model::Order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// ready → delivered attempted while the order is unpaid.
    UnpaidDelivery,
    /// No transition leaves a terminal status.
    Terminal { from: OrderStatus },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::UnpaidDelivery => write!(f, "cannot deliver unpaid order"),
            TransitionError::Terminal { from } => {
                write!(f, "order is {from}; no further status transition")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// The status one step forward from `status`.
pub fn next_status(status: OrderStatus, paid: bool) -> Result<OrderStatus, TransitionError> {
    match (status, paid) {
        (OrderStatus::InProgress, _) => Ok(OrderStatus::Ready),
        (OrderStatus::Ready, true) => Ok(OrderStatus::Delivered),
        (OrderStatus::Ready, false) => Err(TransitionError::UnpaidDelivery),
        (from @ OrderStatus::Delivered, _) => Err(TransitionError::Terminal { from }),
    }
}

pub fn advance(order: &Order) -> Result<OrderStatus, TransitionError> {
    next_status(order.status, order.paid)
}
