//! Persistence gateway for workshop orders, items, clients and ledger
//! entries.
//!
//! [`Gateway`] and [`ClientDirectory`] are the only surface the service
//! layer sees. Two implementations: [`MemoryGateway`] (in process, used by
//! tests and dry runs) and [`PgGateway`] (Postgres via sqlx). Both enforce
//! the ledger uniqueness constraints that make concurrent payment writes
//! safe.

mod gateway;
mod memory;
mod postgres;

pub use gateway::{
    ClientDirectory, Gateway, GatewayError, GatewayResult, Snapshot, UQ_LEDGER_IDEMPOTENCY_KEY,
    UQ_LEDGER_ORDER_KIND,
};
pub use memory::{FaultOp, MemoryGateway};
pub use postgres::{DbStatus, PgGateway, ENV_DB_URL};
