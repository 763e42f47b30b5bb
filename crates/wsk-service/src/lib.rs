//! Order service façade.
//!
//! One [`OrderService`] owns an injected gateway and a snapshot of every
//! order and ledger entry. Commands follow read snapshot → decide (pure
//! crates) → write through the gateway → refetch everything.

mod error;
mod service;

pub use error::ServiceError;
pub use service::{EntryInput, OrderService};

pub use wsk_ledger::{DailyTotal, LedgerQuery, LedgerSummary};
pub use wsk_orders::{ItemInput, Order, OrderInput};
pub use wsk_reconcile::{PaymentOutcome, PaymentPolicy, SweepReport};
