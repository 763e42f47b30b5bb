//! wsk-reconcile
//!
//! Keeps an order's paid flag and its payment ledger entry in lockstep.
//!
//! - [`plan_payment`] decides the single ledger mutation (if any) and the
//!   flag value for one `set paid` command.
//! - [`sweep`] audits a whole data set and reports every order whose flag
//!   and entries disagree.
//!
//! Deterministic, pure logic. No IO. Time comes in as a parameter.

mod payment;
mod sweep;
mod types;

pub use payment::{payment_key, plan_payment};
pub use sweep::sweep;
pub use types::*;
