//! wsk-ledger
//!
//! In-memory ledger of revenue and expense entries, rebuilt from each
//! fetched snapshot. Pure: no IO, no clock, no randomness.
//!
//! - [`Ledger`] owns the append/remove boundary and its uniqueness rules.
//! - [`LedgerQuery`] filters entries; summaries fold a filtered view.
//! - [`marker`] reads and writes the payment description marker.

pub mod marker;
mod query;
mod store;

pub use query::{DailyTotal, LedgerQuery, LedgerSummary};
pub use store::{attributed_order, Ledger, LedgerError};
